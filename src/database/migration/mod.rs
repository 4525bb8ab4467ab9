//! Schema migrations, guarded by the integer `SCHEMA_VERSION` from spec §4.3.

mod m20240101_000001_create_files_and_blobs;
mod m20240101_000002_create_schema_meta;

use sea_orm_migration::prelude::*;

pub struct Migrator;

/// Current schema version. Bumped whenever a migration is appended.
pub const SCHEMA_VERSION: i32 = 2;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
	fn migrations() -> Vec<Box<dyn MigrationTrait>> {
		vec![
			Box::new(m20240101_000001_create_files_and_blobs::Migration),
			Box::new(m20240101_000002_create_schema_meta::Migration),
		]
	}
}
