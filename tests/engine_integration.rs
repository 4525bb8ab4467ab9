//! End-to-end coverage over the Filesystem Engine's public surface,
//! exercising the round-trip laws and crash-safety orderings spec §8
//! calls out explicitly (write/read, copy dedup, unlink/cleanup,
//! rename/rename).

use std::sync::Arc;

use vfsd::blob::BlobStore;
use vfsd::database::Database;
use vfsd::engine::{CopyOptions, FilesystemEngine, MkdirOptions, OrphanCleanupConfig, WriteFlags};

async fn build_engine() -> FilesystemEngine {
	let db = Database::open_in_memory().await.expect("open in-memory db");
	let blobs = Arc::new(BlobStore::new(db.conn().clone(), None, None, 1024 * 1024));
	let orphan_config = OrphanCleanupConfig {
		min_orphan_count: 0,
		min_orphan_age_ms: 0,
		batch_size: 100,
		r#async: false,
	};
	FilesystemEngine::new(db, blobs, "/", orphan_config)
}

#[tokio::test]
async fn write_then_read_round_trips_content() {
	let engine = build_engine().await;
	engine.write("/hello.txt", b"hello world", WriteFlags { create: true, ..Default::default() }).await.unwrap();

	let content = engine.read("/hello.txt", None).await.unwrap();
	assert_eq!(content, b"hello world");

	let stat = engine.stat("/hello.txt").await.unwrap();
	assert_eq!(stat.size, 11);
}

#[tokio::test]
async fn copy_file_shares_the_underlying_blob() {
	let engine = build_engine().await;
	engine.write("/a.txt", b"shared bytes", WriteFlags { create: true, ..Default::default() }).await.unwrap();
	engine
		.copy_file("/a.txt", "/b.txt", CopyOptions { overwrite: false, preserve_metadata: false })
		.await
		.unwrap();

	assert_eq!(engine.read("/b.txt", None).await.unwrap(), b"shared bytes");

	let stats = engine.blobs().dedup_stats().await.unwrap();
	assert_eq!(stats.total_blobs, 1, "copy must not duplicate blob storage");
	assert_eq!(stats.total_refs, 2);
}

#[tokio::test]
async fn unlink_drops_refcount_and_cleanup_purges_orphan() {
	let engine = build_engine().await;
	engine.write("/a.txt", b"temp", WriteFlags { create: true, ..Default::default() }).await.unwrap();
	engine.unlink("/a.txt").await.unwrap();

	let before = engine.blobs().dedup_stats().await.unwrap();
	assert_eq!(before.total_refs, 0);

	let report = engine.orphan_scheduler().run(&engine.blobs()).await.unwrap();
	assert_eq!(report.cleaned, 1);

	let after = engine.blobs().dedup_stats().await.unwrap();
	assert_eq!(after.total_blobs, 0);
}

#[tokio::test]
async fn rename_round_trip_restores_original_state() {
	let engine = build_engine().await;
	engine.mkdir("/dir", MkdirOptions { recursive: true, mode: 0o755 }).await.unwrap();
	engine.write("/dir/f.txt", b"payload", WriteFlags { create: true, ..Default::default() }).await.unwrap();

	engine.rename("/dir/f.txt", "/dir/g.txt", false).await.unwrap();
	assert!(!engine.exists("/dir/f.txt").await.unwrap());
	assert!(engine.exists("/dir/g.txt").await.unwrap());

	engine.rename("/dir/g.txt", "/dir/f.txt", false).await.unwrap();
	assert!(engine.exists("/dir/f.txt").await.unwrap());
	assert!(!engine.exists("/dir/g.txt").await.unwrap());
	assert_eq!(engine.read("/dir/f.txt", None).await.unwrap(), b"payload");
}

#[tokio::test]
async fn rename_of_directory_rewrites_descendant_paths() {
	let engine = build_engine().await;
	engine.mkdir("/src", MkdirOptions { recursive: true, mode: 0o755 }).await.unwrap();
	engine.mkdir("/src/nested", MkdirOptions { recursive: true, mode: 0o755 }).await.unwrap();
	engine.write("/src/nested/leaf.txt", b"deep", WriteFlags { create: true, ..Default::default() }).await.unwrap();

	engine.rename("/src", "/dst", false).await.unwrap();

	assert!(!engine.exists("/src").await.unwrap());
	assert!(engine.exists("/dst/nested/leaf.txt").await.unwrap());
	assert_eq!(engine.read("/dst/nested/leaf.txt", None).await.unwrap(), b"deep");
}

#[tokio::test]
async fn mkdir_rmdir_recursive_round_trip() {
	let engine = build_engine().await;
	engine.mkdir("/a/b/c", MkdirOptions { recursive: true, mode: 0o755 }).await.unwrap();
	assert!(engine.exists("/a/b/c").await.unwrap());

	engine.rmdir("/a", true).await.unwrap();
	assert!(!engine.exists("/a").await.unwrap());
}

#[tokio::test]
async fn write_rejects_path_outside_the_jail_root() {
	let db = Database::open_in_memory().await.unwrap();
	let blobs = Arc::new(BlobStore::new(db.conn().clone(), None, None, 1024));
	let engine = FilesystemEngine::new(db, blobs, "/jail", OrphanCleanupConfig::default());

	let err = engine.write("/etc/passwd", b"x", WriteFlags::default()).await.unwrap_err();
	assert_eq!(err.code(), vfsd::error::ErrorCode::PermissionDenied);
}
