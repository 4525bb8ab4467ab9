//! Blob entity — one row per unique content hash (spec §3.2).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "blobs")]
pub struct Model {
	/// `"blob-" + sha256_hex(content)`.
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: String,

	/// Inline payload, present only while the row lives in the hot tier.
	#[serde(skip_serializing)]
	pub data: Option<Vec<u8>>,

	pub size: i64,
	pub checksum: String,

	/// "hot" | "warm" | "cold"
	pub tier: String,
	pub ref_count: i32,
	pub created_at_ms: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
	pub fn is_orphan(&self) -> bool {
		self.ref_count <= 0
	}

	pub fn tier(&self) -> super::inode::Tier {
		self.tier.parse().unwrap_or(super::inode::Tier::Hot)
	}
}
