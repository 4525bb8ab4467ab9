//! Metadata Store — a single-writer relational store of inodes (spec §4.3).

pub mod entities;
pub mod migration;

use entities::{inode, schema_meta};
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectOptions, Database as SeaDatabase,
	DatabaseConnection, DbErr, EntityTrait, QueryFilter, Statement,
};
use sea_orm::ConnectionTrait;
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use migration::SCHEMA_VERSION;

const SCHEMA_META_ROW_ID: i32 = 1;

const ROOT_MODE: i32 = 0o755;

/// Wraps the sea-orm connection and lazy schema initialization described
/// in spec §4.3: no DDL runs until the first operation touches the store.
pub struct Database {
	conn: DatabaseConnection,
}

impl Database {
	/// Open (creating if absent) the sqlite database at `path`, apply the
	/// PRAGMAs the teacher's `Database::create`/`open` set for write
	/// throughput, run migrations idempotently, and ensure the root
	/// directory row exists.
	pub async fn open(path: &Path) -> Result<Self, DbErr> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)
				.map_err(|e| DbErr::Custom(format!("failed to create data dir: {e}")))?;
		}

		let db_url = format!("sqlite://{}?mode=rwc", path.display());
		let mut opt = ConnectOptions::new(db_url);
		opt.max_connections(10)
			.min_connections(1)
			.connect_timeout(Duration::from_secs(8))
			.idle_timeout(Duration::from_secs(8))
			.sqlx_logging(false);

		let conn = SeaDatabase::connect(opt).await?;
		for pragma in [
			"PRAGMA journal_mode=WAL",
			"PRAGMA synchronous=NORMAL",
			"PRAGMA temp_store=MEMORY",
			"PRAGMA foreign_keys=ON",
		] {
			conn.execute(Statement::from_string(sea_orm::DatabaseBackend::Sqlite, pragma))
				.await?;
		}

		let db = Self { conn };
		db.migrate().await?;
		db.check_schema_version().await?;
		db.ensure_root().await?;
		info!(path = %path.display(), "metadata store ready");
		Ok(db)
	}

	/// In-memory database, used by tests and ephemeral instances.
	pub async fn open_in_memory() -> Result<Self, DbErr> {
		let conn = SeaDatabase::connect("sqlite::memory:").await?;
		let db = Self { conn };
		db.migrate().await?;
		db.check_schema_version().await?;
		db.ensure_root().await?;
		Ok(db)
	}

	async fn migrate(&self) -> Result<(), DbErr> {
		migration::Migrator::up(&self.conn, None).await
	}

	/// Checked at startup per spec §4.3: an absent `schema_meta` row means a
	/// fresh database, stamped at the current version. A stored version
	/// behind `SCHEMA_VERSION` re-runs migrations (already applied
	/// idempotently by `migrate`) and advances the stamp. A stored version
	/// ahead of `SCHEMA_VERSION` means this binary is older than the data
	/// it's pointed at, which is refused rather than silently tolerated.
	async fn check_schema_version(&self) -> Result<(), DbErr> {
		let existing = schema_meta::Entity::find_by_id(SCHEMA_META_ROW_ID)
			.one(&self.conn)
			.await?;

		match existing {
			None => {
				let row = schema_meta::ActiveModel {
					id: Set(SCHEMA_META_ROW_ID),
					version: Set(SCHEMA_VERSION),
				};
				row.insert(&self.conn).await?;
			}
			Some(row) if row.version < SCHEMA_VERSION => {
				warn!(from = row.version, to = SCHEMA_VERSION, "schema_meta behind, migrations already applied above");
				let mut active: schema_meta::ActiveModel = row.into();
				active.version = Set(SCHEMA_VERSION);
				active.update(&self.conn).await?;
			}
			Some(row) if row.version > SCHEMA_VERSION => {
				return Err(DbErr::Custom(format!(
					"database schema_meta version {} is newer than this binary's SCHEMA_VERSION {}",
					row.version, SCHEMA_VERSION
				)));
			}
			Some(_) => {}
		}

		Ok(())
	}

	/// Idempotently insert the root directory row (mode 0o755, nlink 2)
	/// if it does not already exist.
	async fn ensure_root(&self) -> Result<(), DbErr> {
		let existing = inode::Entity::find()
			.filter(inode::Column::Path.eq("/"))
			.one(&self.conn)
			.await?;
		if existing.is_some() {
			return Ok(());
		}

		let now = crate::util::now_ms();
		let root = inode::ActiveModel {
			id: Default::default(),
			path: Set("/".to_string()),
			name: Set("".to_string()),
			parent_id: Set(None),
			kind: Set(inode::InodeKind::Directory.into()),
			mode: Set(ROOT_MODE),
			uid: Set(0),
			gid: Set(0),
			size: Set(0),
			blob_id: Set(None),
			symlink_target: Set(None),
			tier: Set(inode::Tier::Hot.as_str().to_string()),
			atime_ms: Set(now),
			mtime_ms: Set(now),
			ctime_ms: Set(now),
			birth_ms: Set(now),
			nlink: Set(2),
		};
		root.insert(&self.conn).await?;
		Ok(())
	}

	pub fn conn(&self) -> &DatabaseConnection {
		&self.conn
	}
}
