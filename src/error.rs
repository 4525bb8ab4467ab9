//! Error taxonomy shared by every layer of the service.
//!
//! The codes mirror POSIX errno conventions (see spec §7) but this is a
//! taxonomy, not a libc binding: callers match on [`ErrorCode`], never on
//! `errno` values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error code surfaced to RPC clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
	NotFound,
	AlreadyExists,
	NotDirectory,
	IsDirectory,
	NotEmpty,
	InvalidArgument,
	NameTooLong,
	PermissionDenied,
	TooManyLinks,
	ResourceExhausted,
	RateLimited,
	Unavailable,
	Internal,
}

impl ErrorCode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorCode::NotFound => "NotFound",
			ErrorCode::AlreadyExists => "AlreadyExists",
			ErrorCode::NotDirectory => "NotDirectory",
			ErrorCode::IsDirectory => "IsDirectory",
			ErrorCode::NotEmpty => "NotEmpty",
			ErrorCode::InvalidArgument => "InvalidArgument",
			ErrorCode::NameTooLong => "NameTooLong",
			ErrorCode::PermissionDenied => "PermissionDenied",
			ErrorCode::TooManyLinks => "TooManyLinks",
			ErrorCode::ResourceExhausted => "ResourceExhausted",
			ErrorCode::RateLimited => "RateLimited",
			ErrorCode::Unavailable => "Unavailable",
			ErrorCode::Internal => "Internal",
		}
	}
}

/// Unified error type returned by every public operation in this crate.
///
/// Matches the `sd-core` `ApiError`/`LocationError` shape: named variants
/// with human messages, `#[from]` for wrapped causes, and a `code()`
/// accessor that callers use instead of matching on variants directly.
#[derive(Debug, Error)]
pub enum FsError {
	#[error("not found: {path}")]
	NotFound { path: String },

	#[error("already exists: {path}")]
	AlreadyExists { path: String },

	#[error("not a directory: {path}")]
	NotDirectory { path: String },

	#[error("is a directory: {path}")]
	IsDirectory { path: String },

	#[error("directory not empty: {path}")]
	NotEmpty { path: String },

	#[error("invalid argument: {reason}")]
	InvalidArgument { reason: String },

	#[error("name too long: {path}")]
	NameTooLong { path: String },

	#[error("permission denied: {path}")]
	PermissionDenied { path: String },

	#[error("too many symlink levels: {path}")]
	TooManyLinks { path: String },

	#[error("resource exhausted: {reason}")]
	ResourceExhausted { reason: String },

	#[error("rate limited, retry after {retry_after_ms}ms")]
	RateLimited { retry_after_ms: u64, is_burst: bool },

	#[error("tier unavailable: {tier}")]
	Unavailable { tier: String },

	#[error("database error: {0}")]
	Database(#[from] sea_orm::DbErr),

	#[error("object store error: {0}")]
	ObjectStore(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("internal error: {0}")]
	Internal(String),
}

impl FsError {
	pub fn code(&self) -> ErrorCode {
		match self {
			FsError::NotFound { .. } => ErrorCode::NotFound,
			FsError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
			FsError::NotDirectory { .. } => ErrorCode::NotDirectory,
			FsError::IsDirectory { .. } => ErrorCode::IsDirectory,
			FsError::NotEmpty { .. } => ErrorCode::NotEmpty,
			FsError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
			FsError::NameTooLong { .. } => ErrorCode::NameTooLong,
			FsError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
			FsError::TooManyLinks { .. } => ErrorCode::TooManyLinks,
			FsError::ResourceExhausted { .. } => ErrorCode::ResourceExhausted,
			FsError::RateLimited { .. } => ErrorCode::RateLimited,
			FsError::Unavailable { .. } => ErrorCode::Unavailable,
			FsError::Database(_) | FsError::ObjectStore(_) | FsError::Io(_) | FsError::Internal(_) => {
				ErrorCode::Internal
			}
		}
	}

	pub fn not_found(path: impl Into<String>) -> Self {
		Self::NotFound { path: path.into() }
	}

	pub fn invalid_argument(reason: impl Into<String>) -> Self {
		Self::InvalidArgument {
			reason: reason.into(),
		}
	}
}

/// Wire shape for an RPC error response (spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub code: String,
	pub message: String,
	pub path: Option<String>,
}

impl From<&FsError> for ErrorResponse {
	fn from(err: &FsError) -> Self {
		let path = match err {
			FsError::NotFound { path }
			| FsError::AlreadyExists { path }
			| FsError::NotDirectory { path }
			| FsError::IsDirectory { path }
			| FsError::NotEmpty { path }
			| FsError::NameTooLong { path }
			| FsError::PermissionDenied { path }
			| FsError::TooManyLinks { path } => Some(path.clone()),
			_ => None,
		};
		Self {
			code: err.code().as_str().to_string(),
			message: err.to_string(),
			path,
		}
	}
}

pub type FsResult<T> = Result<T, FsError>;
