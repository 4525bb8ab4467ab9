//! Request/response shapes for the Filesystem Engine's POSIX surface (spec §4.4).

use serde::{Deserialize, Serialize};

use crate::database::entities::inode::{InodeKind, Tier};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stat {
	pub path: String,
	pub kind: InodeKindWire,
	pub mode: i32,
	pub uid: i32,
	pub gid: i32,
	pub size: i64,
	pub tier: String,
	pub atime_ms: i64,
	pub mtime_ms: i64,
	pub ctime_ms: i64,
	pub birth_ms: i64,
	pub nlink: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InodeKindWire {
	File,
	Directory,
	Symlink,
}

impl From<InodeKind> for InodeKindWire {
	fn from(k: InodeKind) -> Self {
		match k {
			InodeKind::File => InodeKindWire::File,
			InodeKind::Directory => InodeKindWire::Directory,
			InodeKind::Symlink => InodeKindWire::Symlink,
		}
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteFlags {
	pub create: bool,
	pub exclusive: bool,
	pub append: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MkdirOptions {
	pub recursive: bool,
	pub mode: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReaddirOptions {
	pub recursive: bool,
	pub with_types: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
	pub name: String,
	pub path: String,
	pub kind: Option<InodeKindWire>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
	pub overwrite: bool,
	pub preserve_metadata: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
	pub start: u64,
	pub end: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Tiering {
	pub tier: Tier,
}
