//! Streaming endpoint (spec §6.2): byte-range reads over HTTP with
//! conditional-request and `Accept-Ranges` support.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::engine::{ByteRange, FilesystemEngine};
use crate::error::FsError;

#[derive(Clone)]
pub struct HttpState {
	pub engine: Arc<FilesystemEngine>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
	pub path: String,
}

/// `Content-Type` by extension (spec §6.2's recognized-extension list),
/// falling back to `application/octet-stream`.
fn content_type_for(path: &str) -> &'static str {
	let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
	match ext.as_str() {
		"json" => "application/json",
		"txt" => "text/plain",
		"html" | "htm" => "text/html",
		"css" => "text/css",
		"js" | "mjs" => "application/javascript",
		"ts" | "tsx" => "application/typescript",
		"xml" => "application/xml",
		"svg" => "image/svg+xml",
		"png" => "image/png",
		"jpg" | "jpeg" => "image/jpeg",
		"gif" => "image/gif",
		"webp" => "image/webp",
		"ico" => "image/x-icon",
		"pdf" => "application/pdf",
		"zip" => "application/zip",
		"md" | "mdx" => "text/markdown",
		"wasm" => "application/wasm",
		"mp3" => "audio/mpeg",
		"mp4" => "video/mp4",
		"webm" => "video/webm",
		_ => "application/octet-stream",
	}
}

fn http_date(ms: i64) -> String {
	Utc.timestamp_millis_opt(ms)
		.single()
		.unwrap_or_else(Utc::now)
		.format("%a, %d %b %Y %H:%M:%S GMT")
		.to_string()
}

/// `bytes=start-end` / `bytes=start-` / `bytes=-suffix`, resolved against
/// a known total `size` (spec §8 boundary behaviors).
fn parse_range_header(raw: &str, size: u64) -> Option<Result<ByteRange, ()>> {
	let spec = raw.strip_prefix("bytes=")?;
	let (start_s, end_s) = spec.split_once('-')?;

	if start_s.is_empty() {
		let suffix: u64 = end_s.parse().ok()?;
		if suffix == 0 || size == 0 {
			return Some(Err(()));
		}
		let start = size.saturating_sub(suffix);
		return Some(Ok(ByteRange { start, end: size - 1 }));
	}

	let start: u64 = start_s.parse().ok()?;
	if start >= size {
		return Some(Err(()));
	}
	let end = if end_s.is_empty() {
		size.saturating_sub(1)
	} else {
		end_s.parse::<u64>().ok()?.min(size.saturating_sub(1))
	};
	if end < start {
		return Some(Err(()));
	}
	Some(Ok(ByteRange { start, end }))
}

fn error_status(err: &FsError) -> StatusCode {
	match err.code() {
		crate::error::ErrorCode::NotFound => StatusCode::NOT_FOUND,
		crate::error::ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
		crate::error::ErrorCode::InvalidArgument | crate::error::ErrorCode::NameTooLong => {
			StatusCode::BAD_REQUEST
		}
		crate::error::ErrorCode::IsDirectory | crate::error::ErrorCode::NotDirectory => {
			StatusCode::CONFLICT
		}
		_ => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

pub async fn stream_file(
	State(state): State<HttpState>,
	Query(query): Query<StreamQuery>,
	headers: HeaderMap,
) -> Response {
	let stat = match state.engine.stat(&query.path).await {
		Ok(s) => s,
		Err(e) => return (error_status(&e), e.to_string()).into_response(),
	};

	let content = match state.engine.read(&query.path, None).await {
		Ok(c) => c,
		Err(e) => return (error_status(&e), e.to_string()).into_response(),
	};

	let size = stat.size as u64;
	let etag = format!("\"{}-{}\"", stat.size, stat.mtime_ms);
	let last_modified = http_date(stat.mtime_ms);

	if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
		if if_none_match == etag || if_none_match == "*" {
			return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
		}
	}
	if let Some(if_match) = headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok()) {
		if if_match != etag && if_match != "*" {
			return StatusCode::PRECONDITION_FAILED.into_response();
		}
	}

	let content_type = content_type_for(&query.path);

	if let Some(range_header) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
		match parse_range_header(range_header, size) {
			Some(Ok(range)) => {
				let start = range.start as usize;
				let end = (range.end as usize + 1).min(content.len());
				let body = content[start..end].to_vec();
				return (
					StatusCode::PARTIAL_CONTENT,
					[
						(header::CONTENT_TYPE, content_type.to_string()),
						(header::CONTENT_RANGE, format!("bytes {}-{}/{}", range.start, range.end, size)),
						(header::ACCEPT_RANGES, "bytes".to_string()),
						(header::ETAG, etag),
						(header::LAST_MODIFIED, last_modified),
					],
					body,
				)
					.into_response();
			}
			Some(Err(())) => {
				return (
					StatusCode::RANGE_NOT_SATISFIABLE,
					[(header::CONTENT_RANGE, format!("bytes */{size}"))],
				)
					.into_response();
			}
			None => {}
		}
	}

	(
		StatusCode::OK,
		[
			(header::CONTENT_TYPE, content_type.to_string()),
			(header::CONTENT_LENGTH, size.to_string()),
			(header::ACCEPT_RANGES, "bytes".to_string()),
			(header::ETAG, etag),
			(header::LAST_MODIFIED, last_modified),
		],
		content,
	)
		.into_response()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn range_start_end_inclusive() {
		let r = parse_range_header("bytes=7-11", 13).unwrap().unwrap();
		assert_eq!(r, ByteRange { start: 7, end: 11 });
	}

	#[test]
	fn range_open_ended() {
		let r = parse_range_header("bytes=7-", 13).unwrap().unwrap();
		assert_eq!(r, ByteRange { start: 7, end: 12 });
	}

	#[test]
	fn range_suffix() {
		let r = parse_range_header("bytes=-5", 13).unwrap().unwrap();
		assert_eq!(r, ByteRange { start: 8, end: 12 });
	}

	#[test]
	fn range_start_past_size_is_unsatisfiable() {
		assert!(parse_range_header("bytes=100-200", 13).unwrap().is_err());
	}

	#[test]
	fn single_byte_range() {
		let r = parse_range_header("bytes=0-0", 13).unwrap().unwrap();
		assert_eq!(r, ByteRange { start: 0, end: 0 });
	}
}
