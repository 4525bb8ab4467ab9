//! Covers the JSON-RPC dispatch surface against a real engine instance,
//! independent of the HTTP transport.

use std::sync::Arc;

use serde_json::json;
use vfsd::blob::BlobStore;
use vfsd::database::Database;
use vfsd::engine::{FilesystemEngine, OrphanCleanupConfig};
use vfsd::rpc::{dispatch, RpcRequest, RpcResponse};

async fn build_engine() -> Arc<FilesystemEngine> {
	let db = Database::open_in_memory().await.unwrap();
	let blobs = Arc::new(BlobStore::new(db.conn().clone(), None, None, 1024 * 1024));
	Arc::new(FilesystemEngine::new(db, blobs, "/", OrphanCleanupConfig::default()))
}

fn ok_result(resp: RpcResponse) -> serde_json::Value {
	match resp {
		RpcResponse::Ok { result } => result,
		RpcResponse::Err { error } => panic!("expected ok, got error: {error:?}"),
	}
}

#[tokio::test]
async fn write_then_read_through_dispatch() {
	let engine = build_engine().await;

	let write = RpcRequest {
		method: "write".to_string(),
		params: json!({ "path": "/note.txt", "content": "hi there" }),
	};
	ok_result(dispatch(&engine, write).await);

	let read = RpcRequest { method: "read".to_string(), params: json!({ "path": "/note.txt" }) };
	let result = ok_result(dispatch(&engine, read).await);
	assert_eq!(result.as_str().unwrap(), "hi there");
}

#[tokio::test]
async fn unknown_method_returns_invalid_argument_error() {
	let engine = build_engine().await;
	let req = RpcRequest { method: "frobnicate".to_string(), params: json!({}) };

	match dispatch(&engine, req).await {
		RpcResponse::Err { error } => assert_eq!(error.code, "InvalidArgument"),
		RpcResponse::Ok { .. } => panic!("expected an error response"),
	}
}

#[tokio::test]
async fn stat_on_missing_path_returns_not_found_error() {
	let engine = build_engine().await;
	let req = RpcRequest { method: "stat".to_string(), params: json!({ "path": "/missing.txt" }) };

	match dispatch(&engine, req).await {
		RpcResponse::Err { error } => assert_eq!(error.code, "NotFound"),
		RpcResponse::Ok { .. } => panic!("expected an error response"),
	}
}

#[tokio::test]
async fn mkdir_then_readdir_lists_children() {
	let engine = build_engine().await;
	ok_result(dispatch(&engine, RpcRequest { method: "mkdir".to_string(), params: json!({ "path": "/dir" }) }).await);
	ok_result(
		dispatch(&engine, RpcRequest { method: "write".to_string(), params: json!({ "path": "/dir/a.txt", "content": "x" }) })
			.await,
	);

	let listing = ok_result(
		dispatch(&engine, RpcRequest { method: "readdir".to_string(), params: json!({ "path": "/dir" }) }).await,
	);
	let entries = listing.as_array().unwrap();
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0]["name"], "a.txt");
}
