//! Inode entity — one row per file, directory or symlink (spec §3.1).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i64,

	#[sea_orm(unique)]
	pub path: String,
	pub name: String,
	pub parent_id: Option<i64>,

	/// 0 = file, 1 = directory, 2 = symlink
	pub kind: i32,
	pub mode: i32,
	pub uid: i32,
	pub gid: i32,
	pub size: i64,

	pub blob_id: Option<String>,
	pub symlink_target: Option<String>,

	/// "hot" | "warm" | "cold"
	pub tier: String,

	pub atime_ms: i64,
	pub mtime_ms: i64,
	pub ctime_ms: i64,
	pub birth_ms: i64,

	pub nlink: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "Entity",
		from = "Column::ParentId",
		to = "Column::Id",
		on_delete = "Cascade"
	)]
	Parent,
}

impl ActiveModelBehavior for ActiveModel {}

/// Inode kind tag, matching spec §3.1's `file | directory | symlink`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InodeKind {
	File = 0,
	Directory = 1,
	Symlink = 2,
}

impl From<i32> for InodeKind {
	fn from(value: i32) -> Self {
		match value {
			1 => InodeKind::Directory,
			2 => InodeKind::Symlink,
			_ => InodeKind::File,
		}
	}
}

impl From<InodeKind> for i32 {
	fn from(kind: InodeKind) -> Self {
		kind as i32
	}
}

/// Storage tier tag, matching spec §3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
	Hot,
	Warm,
	Cold,
}

impl Default for Tier {
	fn default() -> Self {
		Tier::Hot
	}
}

impl Tier {
	pub fn as_str(&self) -> &'static str {
		match self {
			Tier::Hot => "hot",
			Tier::Warm => "warm",
			Tier::Cold => "cold",
		}
	}
}

impl std::str::FromStr for Tier {
	type Err = crate::error::FsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"hot" => Ok(Tier::Hot),
			"warm" => Ok(Tier::Warm),
			"cold" => Ok(Tier::Cold),
			other => Err(crate::error::FsError::invalid_argument(format!(
				"unknown tier: {other}"
			))),
		}
	}
}

impl Model {
	pub fn kind(&self) -> InodeKind {
		InodeKind::from(self.kind)
	}

	pub fn tier(&self) -> Tier {
		self.tier.parse().unwrap_or(Tier::Hot)
	}

	pub fn is_directory(&self) -> bool {
		self.kind() == InodeKind::Directory
	}

	pub fn is_symlink(&self) -> bool {
		self.kind() == InodeKind::Symlink
	}
}
