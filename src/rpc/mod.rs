//! RPC surface (spec §6.1): a request carries a method name and a
//! parameter map; a response is either a result object or a typed error.

pub mod http;
pub mod watch_ws;

use serde_json::{json, Value};
use std::sync::Arc;

use crate::database::entities::inode::Tier;
use crate::engine::{ByteRange, CopyOptions, FilesystemEngine, MkdirOptions, ReaddirOptions, WriteFlags};
use crate::error::{ErrorResponse, FsError, FsResult};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RpcRequest {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum RpcResponse {
	Ok { result: Value },
	Err { error: ErrorResponse },
}

impl RpcResponse {
	pub fn ok(result: Value) -> Self {
		RpcResponse::Ok { result }
	}

	pub fn err(err: &FsError) -> Self {
		RpcResponse::Err { error: err.into() }
	}
}

fn param_str(params: &Value, key: &str) -> FsResult<String> {
	params
		.get(key)
		.and_then(Value::as_str)
		.map(str::to_string)
		.ok_or_else(|| FsError::invalid_argument(format!("missing string param `{key}`")))
}

fn param_bytes(params: &Value, key: &str) -> FsResult<Vec<u8>> {
	let s = param_str(params, key)?;
	Ok(s.into_bytes())
}

fn param_bool(params: &Value, key: &str, default: bool) -> bool {
	params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn param_i64(params: &Value, key: &str, default: i64) -> i64 {
	params.get(key).and_then(Value::as_i64).unwrap_or(default)
}

/// Dispatches one RPC method call against the engine. The method/param
/// contracts are exactly those specified in spec §4.4; this function is
/// pure plumbing between the JSON parameter map and the engine's typed
/// calls.
pub async fn dispatch(engine: &Arc<FilesystemEngine>, req: RpcRequest) -> RpcResponse {
	match dispatch_inner(engine, &req.method, &req.params).await {
		Ok(result) => RpcResponse::ok(result),
		Err(e) => RpcResponse::err(&e),
	}
}

async fn dispatch_inner(engine: &Arc<FilesystemEngine>, method: &str, params: &Value) -> FsResult<Value> {
	match method {
		"stat" => {
			let path = param_str(params, "path")?;
			Ok(json!(engine.stat(&path).await?))
		}
		"lstat" => {
			let path = param_str(params, "path")?;
			Ok(json!(engine.lstat(&path).await?))
		}
		"exists" => {
			let path = param_str(params, "path")?;
			Ok(json!(engine.exists(&path).await?))
		}
		"access" => {
			let path = param_str(params, "path")?;
			let mode = params.get("mode").and_then(Value::as_i64).unwrap_or(0) as i32;
			engine.access(&path, mode).await?;
			Ok(json!(null))
		}
		"read" => {
			let path = param_str(params, "path")?;
			let range = parse_range(params);
			let bytes = engine.read(&path, range).await?;
			Ok(json!(String::from_utf8_lossy(&bytes).to_string()))
		}
		"write" => {
			let path = param_str(params, "path")?;
			let content = param_bytes(params, "content")?;
			let flags = WriteFlags {
				create: param_bool(params, "create", true),
				exclusive: param_bool(params, "exclusive", false),
				append: param_bool(params, "append", false),
			};
			engine.write(&path, &content, flags).await?;
			Ok(json!(null))
		}
		"append" => {
			let path = param_str(params, "path")?;
			let content = param_bytes(params, "content")?;
			engine.append(&path, &content).await?;
			Ok(json!(null))
		}
		"truncate" => {
			let path = param_str(params, "path")?;
			let len = param_i64(params, "length", 0).max(0) as u64;
			engine.truncate(&path, len).await?;
			Ok(json!(null))
		}
		"unlink" => {
			let path = param_str(params, "path")?;
			engine.unlink(&path).await?;
			Ok(json!(null))
		}
		"mkdir" => {
			let path = param_str(params, "path")?;
			let opts = MkdirOptions {
				recursive: param_bool(params, "recursive", false),
				mode: params.get("mode").and_then(Value::as_i64).unwrap_or(0o755) as i32,
			};
			engine.mkdir(&path, opts).await?;
			Ok(json!(null))
		}
		"rmdir" => {
			let path = param_str(params, "path")?;
			let recursive = param_bool(params, "recursive", false);
			engine.rmdir(&path, recursive).await?;
			Ok(json!(null))
		}
		"rm" => {
			let path = param_str(params, "path")?;
			let recursive = param_bool(params, "recursive", false);
			let force = param_bool(params, "force", false);
			engine.rm(&path, recursive, force).await?;
			Ok(json!(null))
		}
		"readdir" => {
			let path = param_str(params, "path")?;
			let opts = ReaddirOptions {
				recursive: param_bool(params, "recursive", false),
				with_types: param_bool(params, "withTypes", false),
			};
			Ok(json!(engine.readdir(&path, opts).await?))
		}
		"rename" => {
			let from = param_str(params, "from")?;
			let to = param_str(params, "to")?;
			let overwrite = param_bool(params, "overwrite", false);
			engine.rename(&from, &to, overwrite).await?;
			Ok(json!(null))
		}
		"copyFile" => {
			let from = param_str(params, "from")?;
			let to = param_str(params, "to")?;
			let opts = CopyOptions {
				overwrite: param_bool(params, "overwrite", false),
				preserve_metadata: param_bool(params, "preserveMetadata", false),
			};
			engine.copy_file(&from, &to, opts).await?;
			Ok(json!(null))
		}
		"copyDir" => {
			let from = param_str(params, "from")?;
			let to = param_str(params, "to")?;
			let opts = CopyOptions {
				overwrite: param_bool(params, "overwrite", false),
				preserve_metadata: param_bool(params, "preserveMetadata", false),
			};
			engine.copy_dir(&from, &to, opts).await?;
			Ok(json!(null))
		}
		"symlink" => {
			let target = param_str(params, "target")?;
			let path = param_str(params, "path")?;
			engine.symlink(&target, &path).await?;
			Ok(json!(null))
		}
		"link" => {
			let from = param_str(params, "from")?;
			let to = param_str(params, "to")?;
			engine.link(&from, &to).await?;
			Ok(json!(null))
		}
		"readlink" => {
			let path = param_str(params, "path")?;
			Ok(json!(engine.readlink(&path).await?))
		}
		"realpath" => {
			let path = param_str(params, "path")?;
			Ok(json!(engine.realpath(&path).await?))
		}
		"chmod" => {
			let path = param_str(params, "path")?;
			let mode = params.get("mode").and_then(Value::as_i64).unwrap_or(0) as i32;
			engine.chmod(&path, mode).await?;
			Ok(json!(null))
		}
		"chown" => {
			let path = param_str(params, "path")?;
			let uid = params.get("uid").and_then(Value::as_i64).unwrap_or(0) as i32;
			let gid = params.get("gid").and_then(Value::as_i64).unwrap_or(0) as i32;
			engine.chown(&path, uid, gid).await?;
			Ok(json!(null))
		}
		"utimes" => {
			let path = param_str(params, "path")?;
			let atime = param_i64(params, "atimeMs", 0);
			let mtime = param_i64(params, "mtimeMs", 0);
			engine.utimes(&path, atime, mtime).await?;
			Ok(json!(null))
		}
		"setTier" => {
			let path = param_str(params, "path")?;
			let tier: Tier = param_str(params, "tier")?.parse()?;
			engine.set_tier(&path, tier).await?;
			Ok(json!(null))
		}
		other => Err(FsError::invalid_argument(format!("unknown method `{other}`"))),
	}
}

fn parse_range(params: &Value) -> Option<ByteRange> {
	let range = params.get("range")?;
	let start = range.get("start")?.as_u64()?;
	let end = range.get("end")?.as_u64()?;
	Some(ByteRange { start, end })
}
