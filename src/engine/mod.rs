//! Filesystem Engine — the POSIX-flavored surface over the Metadata Store
//! and Blob Store (spec §4.4). Exclusively owns every mutation; nothing
//! else writes to `files`/`blobs` directly (spec §3.6).

pub mod event;
pub mod handle;
pub mod orphan;
pub mod transaction;
pub mod types;

use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
	QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::blob::BlobStore;
use crate::database::entities::inode::{self, InodeKind, Tier};
use crate::database::Database;
use crate::error::{FsError, FsResult};
use crate::path::PathValidator;
use crate::util::now_ms;

pub use event::{ChangeEvent, ChangeKind};
pub use handle::{FileHandle, ReadStream, WriteStream, DEFAULT_HIGH_WATER_MARK};
pub use orphan::{CleanupReport, OrphanCleanupConfig, OrphanCleanupScheduler};
pub use transaction::EngineTransaction;
pub use types::*;

pub const MAX_SYMLINK_HOPS: u32 = 40;

pub struct FilesystemEngine {
	db: Database,
	blobs: Arc<BlobStore>,
	validator: PathValidator,
	root: String,
	events_tx: broadcast::Sender<ChangeEvent>,
	orphan: Arc<OrphanCleanupScheduler>,
}

impl FilesystemEngine {
	pub fn new(db: Database, blobs: Arc<BlobStore>, root: impl Into<String>, orphan_config: OrphanCleanupConfig) -> Self {
		let (events_tx, _) = broadcast::channel(1024);
		Self {
			db,
			blobs,
			validator: PathValidator::new(),
			root: root.into(),
			events_tx,
			orphan: Arc::new(OrphanCleanupScheduler::new(orphan_config)),
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
		self.events_tx.subscribe()
	}

	pub fn orphan_scheduler(&self) -> Arc<OrphanCleanupScheduler> {
		self.orphan.clone()
	}

	pub fn blobs(&self) -> Arc<BlobStore> {
		self.blobs.clone()
	}

	fn emit(&self, event: ChangeEvent) {
		debug!(kind = ?event.kind, path = %event.path, "emitting change event");
		let _ = self.events_tx.send(event);
	}

	/// Opportunistically kick the orphan cleanup scheduler; safe to call
	/// from any mutation path (spec §4.4 `maybeRunBackgroundCleanup`).
	pub async fn maybe_run_background_cleanup(&self) {
		self.orphan.maybe_run_background(self.blobs.clone()).await;
	}

	fn validate(&self, path: &str) -> FsResult<String> {
		self.validator.validate(path, &self.root)
	}

	// ---- transaction API (spec §4.4, §5) --------------------------------

	pub async fn begin_transaction(&self) -> FsResult<EngineTransaction> {
		EngineTransaction::begin(self.db.conn()).await
	}

	/// Run several writes atomically: either all land or none do (spec
	/// §4.4 `writeMany`).
	pub async fn write_many(&self, writes: Vec<(String, Vec<u8>, WriteFlags)>) -> FsResult<()> {
		let txn = self.db.conn().begin().await?;
		let mut events = Vec::new();
		for (path, content, flags) in writes {
			let normalized = self.validate(&path)?;
			let ev = self.write_in(&txn, &normalized, &content, flags).await?;
			events.push(ev);
		}
		txn.commit().await?;
		for ev in events {
			self.emit(ev);
		}
		self.maybe_run_background_cleanup().await;
		Ok(())
	}

	// ---- lookups ----------------------------------------------------------

	async fn find_by_path<C: ConnectionTrait>(&self, conn: &C, path: &str) -> FsResult<Option<inode::Model>> {
		Ok(inode::Entity::find()
			.filter(inode::Column::Path.eq(path.to_string()))
			.one(conn)
			.await?)
	}

	async fn require_by_path<C: ConnectionTrait>(&self, conn: &C, path: &str) -> FsResult<inode::Model> {
		self.find_by_path(conn, path)
			.await?
			.ok_or_else(|| FsError::not_found(path))
	}

	/// Follow a symlink chain until a non-symlink inode is reached, bounded
	/// at `MAX_SYMLINK_HOPS` (spec §4.4 read semantics).
	async fn resolve_symlinks<C: ConnectionTrait>(&self, conn: &C, start: inode::Model) -> FsResult<inode::Model> {
		let mut current = start;
		let mut hops = 0u32;
		while current.is_symlink() {
			hops += 1;
			if hops > MAX_SYMLINK_HOPS {
				return Err(FsError::TooManyLinks {
					path: current.path.clone(),
				});
			}
			let target = current
				.symlink_target
				.clone()
				.ok_or_else(|| FsError::Internal("symlink row missing target".into()))?;
			let resolved = if target.starts_with('/') {
				target
			} else {
				format!("{}/{}", parent_path(&current.path), target)
			};
			current = self.require_by_path(conn, &resolved).await?;
		}
		Ok(current)
	}

	// ---- stat / existence --------------------------------------------------

	pub async fn stat(&self, path: &str) -> FsResult<Stat> {
		let path = self.validate(path)?;
		let row = self.require_by_path(self.db.conn(), &path).await?;
		let resolved = self.resolve_symlinks(self.db.conn(), row).await?;
		Ok(to_stat(&resolved))
	}

	pub async fn lstat(&self, path: &str) -> FsResult<Stat> {
		let path = self.validate(path)?;
		let row = self.require_by_path(self.db.conn(), &path).await?;
		Ok(to_stat(&row))
	}

	pub async fn exists(&self, path: &str) -> FsResult<bool> {
		let path = self.validate(path)?;
		Ok(self.find_by_path(self.db.conn(), &path).await?.is_some())
	}

	pub async fn access(&self, path: &str, mode: i32) -> FsResult<()> {
		let row = self.require_by_path(self.db.conn(), &self.validate(path)?).await?;
		if mode != 0 && (row.mode & mode) != mode {
			return Err(FsError::PermissionDenied { path: row.path });
		}
		Ok(())
	}

	pub async fn readlink(&self, path: &str) -> FsResult<String> {
		let row = self.require_by_path(self.db.conn(), &self.validate(path)?).await?;
		if !row.is_symlink() {
			return Err(FsError::InvalidArgument {
				reason: format!("{} is not a symlink", row.path),
			});
		}
		row.symlink_target
			.ok_or_else(|| FsError::Internal("symlink row missing target".into()))
	}

	pub async fn realpath(&self, path: &str) -> FsResult<String> {
		let row = self.require_by_path(self.db.conn(), &self.validate(path)?).await?;
		let resolved = self.resolve_symlinks(self.db.conn(), row).await?;
		Ok(resolved.path)
	}

	// ---- directories --------------------------------------------------------

	pub async fn mkdir(&self, path: &str, opts: MkdirOptions) -> FsResult<()> {
		let path = self.validate(path)?;
		let txn = self.db.conn().begin().await?;

		if opts.recursive {
			let mut built = String::new();
			for seg in path.split('/').filter(|s| !s.is_empty()) {
				built.push('/');
				built.push_str(seg);
				if self.find_by_path(&txn, &built).await?.is_none() {
					self.create_directory_row(&txn, &built, opts.mode).await?;
				}
			}
		} else {
			if self.find_by_path(&txn, &path).await?.is_some() {
				return Err(FsError::AlreadyExists { path });
			}
			let parent = parent_path(&path);
			let parent_row = self.require_by_path(&txn, &parent).await?;
			if !parent_row.is_directory() {
				return Err(FsError::NotDirectory { path: parent });
			}
			self.create_directory_row(&txn, &path, opts.mode).await?;
		}

		txn.commit().await?;
		self.emit(ChangeEvent::create(&path, None, true));
		Ok(())
	}

	async fn create_directory_row<C: ConnectionTrait>(&self, conn: &C, path: &str, mode: i32) -> FsResult<()> {
		let now = now_ms();
		let parent_id = self.find_by_path(conn, &parent_path(path)).await?.map(|p| p.id);
		let row = inode::ActiveModel {
			id: Default::default(),
			path: Set(path.to_string()),
			name: Set(leaf_name(path)),
			parent_id: Set(parent_id),
			kind: Set(InodeKind::Directory.into()),
			mode: Set(mode),
			uid: Set(0),
			gid: Set(0),
			size: Set(0),
			blob_id: Set(None),
			symlink_target: Set(None),
			tier: Set(Tier::Hot.as_str().to_string()),
			atime_ms: Set(now),
			mtime_ms: Set(now),
			ctime_ms: Set(now),
			birth_ms: Set(now),
			nlink: Set(2),
		};
		row.insert(conn).await?;
		Ok(())
	}

	pub async fn readdir(&self, path: &str, opts: ReaddirOptions) -> FsResult<Vec<DirEntry>> {
		let path = self.validate(path)?;
		let dir = self.require_by_path(self.db.conn(), &path).await?;
		if !dir.is_directory() {
			return Err(FsError::NotDirectory { path });
		}

		let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
		let all = inode::Entity::find()
			.filter(inode::Column::Path.like(format!("{}%", escape_like(&prefix))))
			.order_by_asc(inode::Column::Path)
			.all(self.db.conn())
			.await?;

		let mut out = Vec::new();
		for row in all {
			if row.path == path {
				continue;
			}
			let rest = &row.path[prefix.len()..];
			let is_direct_child = !rest.contains('/');
			if !opts.recursive && !is_direct_child {
				continue;
			}
			out.push(DirEntry {
				name: row.name.clone(),
				path: row.path.clone(),
				kind: if opts.with_types { Some(row.kind().into()) } else { None },
			});
		}
		Ok(out)
	}

	pub async fn rmdir(&self, path: &str, recursive: bool) -> FsResult<()> {
		let path = self.validate(path)?;
		let txn = self.db.conn().begin().await?;
		let row = self.require_by_path(&txn, &path).await?;
		if !row.is_directory() {
			return Err(FsError::NotDirectory { path });
		}

		let children = self.direct_children(&txn, &path).await?;
		if !children.is_empty() && !recursive {
			return Err(FsError::NotEmpty { path });
		}

		if recursive {
			self.delete_subtree(&txn, &path).await?;
		} else {
			inode::Entity::delete_by_id(row.id).exec(&txn).await?;
		}

		txn.commit().await?;
		self.emit(ChangeEvent::delete(&path));
		self.maybe_run_background_cleanup().await;
		Ok(())
	}

	/// `rm`: like `rmdir`/`unlink` combined, with a `force` flag that
	/// swallows "not found".
	pub async fn rm(&self, path: &str, recursive: bool, force: bool) -> FsResult<()> {
		let normalized = self.validate(path)?;
		let row = match self.find_by_path(self.db.conn(), &normalized).await? {
			Some(r) => r,
			None if force => return Ok(()),
			None => return Err(FsError::not_found(normalized)),
		};

		let result = if row.is_directory() {
			self.rmdir(path, recursive).await
		} else {
			self.unlink(path).await
		};

		match result {
			Err(FsError::NotFound { .. }) if force => Ok(()),
			other => other,
		}
	}

	/// Depth-first deletion of a subtree, decrementing each contained
	/// blob's reference count. Idempotent under retry: re-running against
	/// an already-empty subtree is a no-op (spec §4.4).
	async fn delete_subtree<C: ConnectionTrait>(&self, conn: &C, path: &str) -> FsResult<()> {
		let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
		let mut descendants = inode::Entity::find()
			.filter(inode::Column::Path.like(format!("{}%", escape_like(&prefix))))
			.all(conn)
			.await?;
		// Deepest paths first so children are removed before their parents.
		descendants.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

		for d in &descendants {
			if let Some(blob_id) = &d.blob_id {
				self.blobs.dec_ref(blob_id).await?;
			}
			inode::Entity::delete_by_id(d.id).exec(conn).await?;
		}

		if let Some(root_row) = self.find_by_path(conn, path).await? {
			if let Some(blob_id) = &root_row.blob_id {
				self.blobs.dec_ref(blob_id).await?;
			}
			inode::Entity::delete_by_id(root_row.id).exec(conn).await?;
		}
		Ok(())
	}

	async fn direct_children<C: ConnectionTrait>(&self, conn: &C, path: &str) -> FsResult<Vec<inode::Model>> {
		let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
		let all = inode::Entity::find()
			.filter(inode::Column::Path.like(format!("{}%", escape_like(&prefix))))
			.all(conn)
			.await?;
		Ok(all
			.into_iter()
			.filter(|row| !row.path[prefix.len()..].contains('/'))
			.collect())
	}

	// ---- read / write -------------------------------------------------------

	pub async fn read(&self, path: &str, range: Option<ByteRange>) -> FsResult<Vec<u8>> {
		let path = self.validate(path)?;
		let row = self.require_by_path(self.db.conn(), &path).await?;
		let resolved = self.resolve_symlinks(self.db.conn(), row).await?;
		if resolved.is_directory() {
			return Err(FsError::IsDirectory { path });
		}

		let content = match &resolved.blob_id {
			Some(id) => self.blobs.get(id).await?.unwrap_or_default(),
			None => Vec::new(),
		};

		// Reading updates access time.
		self.touch_atime(&resolved.path).await?;

		Ok(match range {
			None => content,
			Some(r) => {
				let end = (r.end as usize + 1).min(content.len());
				let start = (r.start as usize).min(end);
				content[start..end].to_vec()
			}
		})
	}

	async fn touch_atime(&self, path: &str) -> FsResult<()> {
		if let Some(row) = self.find_by_path(self.db.conn(), path).await? {
			let mut active: inode::ActiveModel = row.into();
			active.atime_ms = Set(now_ms());
			active.update(self.db.conn()).await?;
		}
		Ok(())
	}

	/// Content-addressed write. Always: encode payload -> blob store `put`
	/// -> set inode blob id -> `decRef` the *old* blob id only after the
	/// new one is committed, so a crash mid-write leaves the old blob live
	/// (spec §4.4 write semantics, crash-safety ordering).
	pub async fn write(&self, path: &str, content: &[u8], flags: WriteFlags) -> FsResult<()> {
		let path = self.validate(path)?;
		let txn = self.db.conn().begin().await?;
		let event = self.write_in(&txn, &path, content, flags).await?;
		txn.commit().await?;
		self.emit(event);
		self.maybe_run_background_cleanup().await;
		Ok(())
	}

	async fn write_in<C: ConnectionTrait>(
		&self,
		conn: &C,
		path: &str,
		content: &[u8],
		flags: WriteFlags,
	) -> FsResult<ChangeEvent> {
		let existing = self.find_by_path(conn, path).await?;

		if existing.is_some() && flags.exclusive {
			return Err(FsError::AlreadyExists { path: path.to_string() });
		}
		if existing.is_none() && !flags.create && !flags.exclusive {
			return Err(FsError::not_found(path));
		}

		let old_blob_id = existing.as_ref().and_then(|r| r.blob_id.clone());
		let new_blob_id = if content.is_empty() {
			None
		} else {
			Some(self.blobs.put(content, None).await?)
		};

		let now = now_ms();
		let is_new = existing.is_none();

		let active = match existing {
			Some(row) => {
				let mut active: inode::ActiveModel = row.into();
				active.blob_id = Set(new_blob_id.clone());
				active.size = Set(content.len() as i64);
				active.mtime_ms = Set(now);
				active.ctime_ms = Set(now);
				active
			}
			None => {
				let parent = parent_path(path);
				let parent_row = self.require_by_path(conn, &parent).await?;
				if !parent_row.is_directory() {
					return Err(FsError::NotDirectory { path: parent });
				}
				inode::ActiveModel {
					id: Default::default(),
					path: Set(path.to_string()),
					name: Set(leaf_name(path)),
					parent_id: Set(Some(parent_row.id)),
					kind: Set(InodeKind::File.into()),
					mode: Set(0o644),
					uid: Set(0),
					gid: Set(0),
					size: Set(content.len() as i64),
					blob_id: Set(new_blob_id.clone()),
					symlink_target: Set(None),
					tier: Set(Tier::Hot.as_str().to_string()),
					atime_ms: Set(now),
					mtime_ms: Set(now),
					ctime_ms: Set(now),
					birth_ms: Set(now),
					nlink: Set(1),
				}
			}
		};

		if is_new {
			active.insert(conn).await?;
		} else {
			active.update(conn).await?;
		}

		// Order matters for crash safety: only decrement the old blob
		// after the new one is durably referenced by the inode row.
		if let (Some(old), Some(new)) = (&old_blob_id, &new_blob_id) {
			if old != new {
				self.blobs.dec_ref(old).await?;
			}
		} else if let Some(old) = &old_blob_id {
			if new_blob_id.is_none() {
				self.blobs.dec_ref(old).await?;
			}
		}

		Ok(if is_new {
			ChangeEvent::create(path, Some(content.len() as i64), false)
		} else {
			ChangeEvent::modify(path, Some(content.len() as i64))
		})
	}

	pub async fn append(&self, path: &str, content: &[u8]) -> FsResult<()> {
		let path = self.validate(path)?;
		let txn = self.db.conn().begin().await?;
		let row = self.require_by_path(&txn, &path).await?;
		let existing = match &row.blob_id {
			Some(id) => self.blobs.get(id).await?.unwrap_or_default(),
			None => Vec::new(),
		};
		let mut combined = existing;
		combined.extend_from_slice(content);

		let event = self
			.write_in(&txn, &path, &combined, WriteFlags::default())
			.await?;
		txn.commit().await?;
		self.emit(event);
		self.maybe_run_background_cleanup().await;
		Ok(())
	}

	pub async fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
		let path = self.validate(path)?;
		let txn = self.db.conn().begin().await?;
		let row = self.require_by_path(&txn, &path).await?;
		let existing = match &row.blob_id {
			Some(id) => self.blobs.get(id).await?.unwrap_or_default(),
			None => Vec::new(),
		};
		let mut truncated = existing;
		truncated.resize(len as usize, 0);

		let event = self
			.write_in(&txn, &path, &truncated, WriteFlags::default())
			.await?;
		txn.commit().await?;
		self.emit(event);
		self.maybe_run_background_cleanup().await;
		Ok(())
	}

	pub async fn unlink(&self, path: &str) -> FsResult<()> {
		let path = self.validate(path)?;
		let txn = self.db.conn().begin().await?;
		let row = self.require_by_path(&txn, &path).await?;
		if row.is_directory() {
			return Err(FsError::IsDirectory { path });
		}
		if let Some(blob_id) = &row.blob_id {
			self.blobs.dec_ref(blob_id).await?;
		}
		inode::Entity::delete_by_id(row.id).exec(&txn).await?;
		txn.commit().await?;
		self.emit(ChangeEvent::delete(&path));
		self.maybe_run_background_cleanup().await;
		Ok(())
	}

	// ---- rename / links / copy ------------------------------------------

	/// Atomically updates path/parent/name/ctime of the source inode; for
	/// a directory, rewrites every descendant's path prefix (spec §4.4).
	pub async fn rename(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()> {
		let src = self.validate(src)?;
		let dst = self.validate(dst)?;
		let txn = self.db.conn().begin().await?;

		let src_row = self.require_by_path(&txn, &src).await?;

		if let Some(target) = self.find_by_path(&txn, &dst).await? {
			if !overwrite {
				return Err(FsError::AlreadyExists { path: dst });
			}
			if target.is_directory() {
				self.delete_subtree(&txn, &dst).await?;
			} else {
				if let Some(blob_id) = &target.blob_id {
					self.blobs.dec_ref(blob_id).await?;
				}
				inode::Entity::delete_by_id(target.id).exec(&txn).await?;
			}
		}

		let dst_parent_path = parent_path(&dst);
		let dst_parent = self.require_by_path(&txn, &dst_parent_path).await?;
		if !dst_parent.is_directory() {
			return Err(FsError::NotDirectory { path: dst_parent_path });
		}

		if src_row.is_directory() {
			let descendants = self.direct_and_nested(&txn, &src).await?;
			for d in descendants {
				let new_path = format!("{}{}", dst, &d.path[src.len()..]);
				let mut active: inode::ActiveModel = d.into();
				active.path = Set(new_path);
				active.update(&txn).await?;
			}
		}

		let mut active: inode::ActiveModel = src_row.into();
		active.path = Set(dst.clone());
		active.name = Set(leaf_name(&dst));
		active.parent_id = Set(Some(dst_parent.id));
		active.ctime_ms = Set(now_ms());
		active.update(&txn).await?;

		txn.commit().await?;
		self.emit(ChangeEvent::rename(&src, &dst));
		self.maybe_run_background_cleanup().await;
		Ok(())
	}

	async fn direct_and_nested<C: ConnectionTrait>(&self, conn: &C, path: &str) -> FsResult<Vec<inode::Model>> {
		let prefix = format!("{path}/");
		Ok(inode::Entity::find()
			.filter(inode::Column::Path.like(format!("{}%", escape_like(&prefix))))
			.all(conn)
			.await?)
	}

	/// Creates a second inode row sharing the same blob id, with `nlink+1`
	/// on both rows and the blob's reference count incremented (spec §4.4).
	pub async fn link(&self, src: &str, dst: &str) -> FsResult<()> {
		let src = self.validate(src)?;
		let dst = self.validate(dst)?;
		let txn = self.db.conn().begin().await?;

		let src_row = self.require_by_path(&txn, &src).await?;
		if src_row.is_directory() {
			return Err(FsError::IsDirectory { path: src });
		}
		if self.find_by_path(&txn, &dst).await?.is_some() {
			return Err(FsError::AlreadyExists { path: dst });
		}
		let dst_parent_path = parent_path(&dst);
		let dst_parent = self.require_by_path(&txn, &dst_parent_path).await?;

		if let Some(blob_id) = &src_row.blob_id {
			self.blobs.inc_ref(blob_id).await?;
		}

		let now = now_ms();
		let new_row = inode::ActiveModel {
			id: Default::default(),
			path: Set(dst.clone()),
			name: Set(leaf_name(&dst)),
			parent_id: Set(Some(dst_parent.id)),
			kind: Set(src_row.kind),
			mode: Set(src_row.mode),
			uid: Set(src_row.uid),
			gid: Set(src_row.gid),
			size: Set(src_row.size),
			blob_id: Set(src_row.blob_id.clone()),
			symlink_target: Set(None),
			tier: Set(src_row.tier.clone()),
			atime_ms: Set(now),
			mtime_ms: Set(now),
			ctime_ms: Set(now),
			birth_ms: Set(now),
			nlink: Set(src_row.nlink + 1),
		};
		new_row.insert(&txn).await?;

		let src_nlink = src_row.nlink;
		let mut src_active: inode::ActiveModel = src_row.into();
		src_active.nlink = Set(src_nlink + 1);
		src_active.update(&txn).await?;

		txn.commit().await?;
		self.emit(ChangeEvent::create(&dst, None, false));
		Ok(())
	}

	/// Target stored verbatim, never validated for existence; dangling
	/// symlinks are permitted by design (spec §4.4).
	pub async fn symlink(&self, target: &str, link_path: &str) -> FsResult<()> {
		let link_path = self.validate(link_path)?;
		let txn = self.db.conn().begin().await?;

		if self.find_by_path(&txn, &link_path).await?.is_some() {
			return Err(FsError::AlreadyExists { path: link_path });
		}
		let parent = parent_path(&link_path);
		let parent_row = self.require_by_path(&txn, &parent).await?;

		let now = now_ms();
		let row = inode::ActiveModel {
			id: Default::default(),
			path: Set(link_path.clone()),
			name: Set(leaf_name(&link_path)),
			parent_id: Set(Some(parent_row.id)),
			kind: Set(InodeKind::Symlink.into()),
			mode: Set(0o777),
			uid: Set(0),
			gid: Set(0),
			size: Set(target.len() as i64),
			blob_id: Set(None),
			symlink_target: Set(Some(target.to_string())),
			tier: Set(Tier::Hot.as_str().to_string()),
			atime_ms: Set(now),
			mtime_ms: Set(now),
			ctime_ms: Set(now),
			birth_ms: Set(now),
			nlink: Set(1),
		};
		row.insert(&txn).await?;

		txn.commit().await?;
		self.emit(ChangeEvent::create(&link_path, None, false));
		Ok(())
	}

	pub async fn copy_file(&self, src: &str, dst: &str, opts: CopyOptions) -> FsResult<()> {
		let src = self.validate(src)?;
		let dst = self.validate(dst)?;
		let txn = self.db.conn().begin().await?;

		let src_row = self.require_by_path(&txn, &src).await?;
		if src_row.is_directory() {
			return Err(FsError::IsDirectory { path: src });
		}
		if let Some(existing) = self.find_by_path(&txn, &dst).await? {
			if !opts.overwrite {
				return Err(FsError::AlreadyExists { path: dst });
			}
			if let Some(blob_id) = &existing.blob_id {
				self.blobs.dec_ref(blob_id).await?;
			}
			inode::Entity::delete_by_id(existing.id).exec(&txn).await?;
		}
		let dst_parent = self.require_by_path(&txn, &parent_path(&dst)).await?;

		// Reuse the source's blob id via incRef rather than rehashing —
		// copies must not duplicate bytes (spec §4.4).
		if let Some(blob_id) = &src_row.blob_id {
			self.blobs.inc_ref(blob_id).await?;
		}

		let now = now_ms();
		let row = inode::ActiveModel {
			id: Default::default(),
			path: Set(dst.clone()),
			name: Set(leaf_name(&dst)),
			parent_id: Set(Some(dst_parent.id)),
			kind: Set(InodeKind::File.into()),
			mode: Set(if opts.preserve_metadata { src_row.mode } else { 0o644 }),
			uid: Set(if opts.preserve_metadata { src_row.uid } else { 0 }),
			gid: Set(if opts.preserve_metadata { src_row.gid } else { 0 }),
			size: Set(src_row.size),
			blob_id: Set(src_row.blob_id.clone()),
			symlink_target: Set(None),
			tier: Set(src_row.tier.clone()),
			atime_ms: Set(now),
			mtime_ms: Set(now),
			ctime_ms: Set(now),
			birth_ms: Set(now),
			nlink: Set(1),
		};
		row.insert(&txn).await?;

		txn.commit().await?;
		self.emit(ChangeEvent::create(&dst, Some(src_row.size), false));
		Ok(())
	}

	/// Recursive directory copy inside one transaction: every file entry
	/// reuses its source blob id via `incRef` (spec §4.4 — "must not
	/// duplicate bytes").
	pub async fn copy_dir(&self, src: &str, dst: &str, opts: CopyOptions) -> FsResult<()> {
		let src = self.validate(src)?;
		let dst = self.validate(dst)?;
		let txn = self.db.conn().begin().await?;

		let src_row = self.require_by_path(&txn, &src).await?;
		if !src_row.is_directory() {
			return Err(FsError::NotDirectory { path: src });
		}
		if self.find_by_path(&txn, &dst).await?.is_some() && !opts.overwrite {
			return Err(FsError::AlreadyExists { path: dst });
		}

		let dst_parent = self.require_by_path(&txn, &parent_path(&dst)).await?;
		let now = now_ms();
		let root_dir = inode::ActiveModel {
			id: Default::default(),
			path: Set(dst.clone()),
			name: Set(leaf_name(&dst)),
			parent_id: Set(Some(dst_parent.id)),
			kind: Set(InodeKind::Directory.into()),
			mode: Set(if opts.preserve_metadata { src_row.mode } else { 0o755 }),
			uid: Set(0),
			gid: Set(0),
			size: Set(0),
			blob_id: Set(None),
			symlink_target: Set(None),
			tier: Set(Tier::Hot.as_str().to_string()),
			atime_ms: Set(now),
			mtime_ms: Set(now),
			ctime_ms: Set(now),
			birth_ms: Set(now),
			nlink: Set(2),
		};
		let inserted_root = root_dir.insert(&txn).await?;

		let mut descendants = self.direct_and_nested(&txn, &src).await?;
		descendants.sort_by(|a, b| a.path.len().cmp(&b.path.len()));

		// Map original path -> newly inserted id, so nested children can
		// look up their new parent id as we walk shallow-to-deep.
		let mut new_ids: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
		new_ids.insert(src.clone(), inserted_root.id);

		for d in descendants {
			let new_path = format!("{}{}", dst, &d.path[src.len()..]);
			let new_parent_id = *new_ids.get(&parent_path(&d.path)).unwrap_or(&inserted_root.id);

			if d.blob_id.is_some() {
				self.blobs.inc_ref(d.blob_id.as_ref().unwrap()).await?;
			}

			let row = inode::ActiveModel {
				id: Default::default(),
				path: Set(new_path.clone()),
				name: Set(d.name.clone()),
				parent_id: Set(Some(new_parent_id)),
				kind: Set(d.kind),
				mode: Set(d.mode),
				uid: Set(d.uid),
				gid: Set(d.gid),
				size: Set(d.size),
				blob_id: Set(d.blob_id.clone()),
				symlink_target: Set(d.symlink_target.clone()),
				tier: Set(d.tier.clone()),
				atime_ms: Set(now),
				mtime_ms: Set(now),
				ctime_ms: Set(now),
				birth_ms: Set(now),
				nlink: Set(1),
			};
			let inserted = row.insert(&txn).await?;
			new_ids.insert(d.path.clone(), inserted.id);
		}

		txn.commit().await?;
		self.emit(ChangeEvent::create(&dst, None, true));
		Ok(())
	}

	// ---- metadata mutation --------------------------------------------------

	pub async fn chmod(&self, path: &str, mode: i32) -> FsResult<()> {
		let row = self.require_by_path(self.db.conn(), &self.validate(path)?).await?;
		let p = row.path.clone();
		let mut active: inode::ActiveModel = row.into();
		active.mode = Set(mode);
		active.ctime_ms = Set(now_ms());
		active.update(self.db.conn()).await?;
		self.emit(ChangeEvent::modify(p, None));
		Ok(())
	}

	pub async fn chown(&self, path: &str, uid: i32, gid: i32) -> FsResult<()> {
		let row = self.require_by_path(self.db.conn(), &self.validate(path)?).await?;
		let p = row.path.clone();
		let mut active: inode::ActiveModel = row.into();
		active.uid = Set(uid);
		active.gid = Set(gid);
		active.ctime_ms = Set(now_ms());
		active.update(self.db.conn()).await?;
		self.emit(ChangeEvent::modify(p, None));
		Ok(())
	}

	pub async fn utimes(&self, path: &str, atime_ms: i64, mtime_ms: i64) -> FsResult<()> {
		let row = self.require_by_path(self.db.conn(), &self.validate(path)?).await?;
		let mut active: inode::ActiveModel = row.into();
		active.atime_ms = Set(atime_ms);
		active.mtime_ms = Set(mtime_ms);
		active.update(self.db.conn()).await?;
		Ok(())
	}

	// ---- tier promotion / demotion ------------------------------------------

	/// Read the payload, move it, update the inode's tier column. No-op if
	/// source equals target (spec §4.4).
	pub async fn set_tier(&self, path: &str, target: Tier) -> FsResult<()> {
		let row = self.require_by_path(self.db.conn(), &self.validate(path)?).await?;
		let Some(blob_id) = &row.blob_id else {
			return Ok(());
		};
		let current = row.tier();
		if current == target {
			return Ok(());
		}
		self.blobs.move_tier(blob_id, current, target).await?;

		let mut active: inode::ActiveModel = row.into();
		active.tier = Set(target.as_str().to_string());
		active.update(self.db.conn()).await?;
		Ok(())
	}

	// ---- open() handles and streams ------------------------------------------

	pub async fn open(&self, path: &str) -> FsResult<FileHandle> {
		let path = self.validate(path)?;
		let row = self.find_by_path(self.db.conn(), &path).await?;
		let initial = match &row {
			Some(r) if r.blob_id.is_some() => {
				self.blobs.get(r.blob_id.as_ref().unwrap()).await?.unwrap_or_default()
			}
			_ => Vec::new(),
		};
		Ok(FileHandle::new(path, initial))
	}

	/// Persist a dirty handle's buffer as one content-addressed write.
	pub async fn sync(&self, handle: &FileHandle) -> FsResult<()> {
		if !handle.is_dirty() {
			return Ok(());
		}
		let snapshot = handle.snapshot();
		self.write(&handle.path, &snapshot, WriteFlags { create: true, ..Default::default() })
			.await?;
		handle.clear_dirty();
		Ok(())
	}

	pub async fn close(&self, handle: FileHandle) -> FsResult<()> {
		self.sync(&handle).await
	}

	pub async fn create_read_stream(&self, path: &str, range: Option<ByteRange>, high_water_mark: usize) -> FsResult<ReadStream> {
		let content = self.read(path, None).await?;
		Ok(ReadStream::new(content, range, high_water_mark))
	}

	pub fn create_write_stream(&self, path: &str, high_water_mark: usize) -> WriteStream {
		WriteStream::new(path.to_string(), high_water_mark)
	}

	/// Materializes the accumulated chunks as a single all-or-nothing
	/// write (spec §4.4 streaming).
	pub async fn finish_write_stream(&self, stream: WriteStream) -> FsResult<()> {
		let path = stream.path.clone();
		let data = stream.finish();
		self.write(&path, &data, WriteFlags { create: true, ..Default::default() }).await
	}
}

fn to_stat(row: &inode::Model) -> Stat {
	Stat {
		path: row.path.clone(),
		kind: row.kind().into(),
		mode: row.mode,
		uid: row.uid,
		gid: row.gid,
		size: row.size,
		tier: row.tier.clone(),
		atime_ms: row.atime_ms,
		mtime_ms: row.mtime_ms,
		ctime_ms: row.ctime_ms,
		birth_ms: row.birth_ms,
		nlink: row.nlink,
	}
}

fn parent_path(path: &str) -> String {
	if path == "/" {
		return "/".to_string();
	}
	match path.rfind('/') {
		Some(0) => "/".to_string(),
		Some(idx) => path[..idx].to_string(),
		None => "/".to_string(),
	}
}

fn leaf_name(path: &str) -> String {
	path.rsplit('/').next().unwrap_or("").to_string()
}

/// Escape `%`/`_` so a path segment used in a `LIKE` prefix match can't be
/// misread as a wildcard.
fn escape_like(s: &str) -> String {
	s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
