//! Change events emitted by the Filesystem Engine on mutation (spec §3.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
	Create,
	Modify,
	Delete,
	Rename,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
	#[serde(rename = "type")]
	pub kind: ChangeKind,
	pub path: String,
	#[serde(rename = "oldPath", skip_serializing_if = "Option::is_none")]
	pub old_path: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub size: Option<i64>,
	#[serde(rename = "isDirectory", skip_serializing_if = "Option::is_none")]
	pub is_directory: Option<bool>,
	/// Emission timestamp, integer milliseconds.
	pub mtime: i64,
}

impl ChangeEvent {
	pub fn create(path: impl Into<String>, size: Option<i64>, is_directory: bool) -> Self {
		Self {
			kind: ChangeKind::Create,
			path: path.into(),
			old_path: None,
			size,
			is_directory: Some(is_directory),
			mtime: crate::util::now_ms(),
		}
	}

	pub fn modify(path: impl Into<String>, size: Option<i64>) -> Self {
		Self {
			kind: ChangeKind::Modify,
			path: path.into(),
			old_path: None,
			size,
			is_directory: Some(false),
			mtime: crate::util::now_ms(),
		}
	}

	pub fn delete(path: impl Into<String>) -> Self {
		Self {
			kind: ChangeKind::Delete,
			path: path.into(),
			old_path: None,
			size: None,
			is_directory: None,
			mtime: crate::util::now_ms(),
		}
	}

	pub fn rename(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
		Self {
			kind: ChangeKind::Rename,
			path: new_path.into(),
			old_path: Some(old_path.into()),
			size: None,
			is_directory: None,
			mtime: crate::util::now_ms(),
		}
	}
}
