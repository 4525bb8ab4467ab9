//! `vfsctl` — a thin HTTP front end over a running `vfsd`, grounded in the
//! teacher's `apps/cli` shape (subcommand-per-domain, human/JSON output
//! toggle) but simplified down to a single RPC client since there is no
//! in-process core to talk to here.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{presets::UTF8_BORDERS_ONLY, Cell, Table};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "vfsctl", about = "Control client for the vfsd filesystem service")]
struct Cli {
	/// Base URL of a running vfsd instance.
	#[arg(long, env = "VFSCTL_SERVER", default_value = "http://127.0.0.1:7864")]
	server: String,

	/// Print raw JSON instead of a human-readable summary.
	#[arg(long, global = true)]
	json: bool,

	#[command(subcommand)]
	cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
	/// Show metadata for a path, following symlinks.
	Stat { path: String },
	/// Show metadata for a path without following a trailing symlink.
	Lstat { path: String },
	/// Print a file's contents to stdout.
	Cat { path: String },
	/// Write stdin or literal text to a file.
	Write {
		path: String,
		content: String,
		#[arg(long)]
		append: bool,
	},
	/// Create a directory.
	Mkdir {
		path: String,
		#[arg(long)]
		recursive: bool,
	},
	/// List a directory's entries.
	Ls {
		path: String,
		#[arg(long)]
		recursive: bool,
	},
	/// Remove an empty directory, or a subtree with --recursive.
	Rmdir {
		path: String,
		#[arg(long)]
		recursive: bool,
	},
	/// Remove a file or directory.
	Rm {
		path: String,
		#[arg(long)]
		recursive: bool,
		#[arg(long)]
		force: bool,
	},
	/// Rename or move a path.
	Mv {
		from: String,
		to: String,
		#[arg(long)]
		overwrite: bool,
	},
	/// Copy a file, sharing blob storage where possible.
	Cp {
		from: String,
		to: String,
		#[arg(long)]
		overwrite: bool,
	},
	/// Create a hard link.
	Ln { from: String, to: String },
	/// Create a symbolic link.
	Symlink { target: String, path: String },
	/// Read a symbolic link's target.
	Readlink { path: String },
	/// Resolve a path to its canonical form.
	Realpath { path: String },
	/// Change a path's permission bits.
	Chmod { path: String, mode: String },
	/// Change a path's owning uid/gid.
	Chown { path: String, uid: i64, gid: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	let client = RpcClient::new(cli.server.clone());

	match cli.cmd {
		Cmd::Stat { path } => print_result(cli.json, client.call("stat", json!({ "path": path })).await?),
		Cmd::Lstat { path } => print_result(cli.json, client.call("lstat", json!({ "path": path })).await?),
		Cmd::Cat { path } => {
			let result = client.call("read", json!({ "path": path })).await?;
			match result.as_str() {
				Some(text) => print!("{text}"),
				None => print_result(cli.json, result),
			}
		}
		Cmd::Write { path, content, append } => {
			let method = if append { "append" } else { "write" };
			client.call(method, json!({ "path": path, "content": content })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
		Cmd::Mkdir { path, recursive } => {
			client.call("mkdir", json!({ "path": path, "recursive": recursive })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
		Cmd::Ls { path, recursive } => {
			let result = client
				.call("readdir", json!({ "path": path, "recursive": recursive, "withTypes": true }))
				.await?;
			if cli.json {
				print_json(&result);
			} else {
				print_listing(&result);
			}
		}
		Cmd::Rmdir { path, recursive } => {
			client.call("rmdir", json!({ "path": path, "recursive": recursive })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
		Cmd::Rm { path, recursive, force } => {
			client.call("rm", json!({ "path": path, "recursive": recursive, "force": force })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
		Cmd::Mv { from, to, overwrite } => {
			client.call("rename", json!({ "from": from, "to": to, "overwrite": overwrite })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
		Cmd::Cp { from, to, overwrite } => {
			client.call("copyFile", json!({ "from": from, "to": to, "overwrite": overwrite })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
		Cmd::Ln { from, to } => {
			client.call("link", json!({ "from": from, "to": to })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
		Cmd::Symlink { target, path } => {
			client.call("symlink", json!({ "target": target, "path": path })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
		Cmd::Readlink { path } => print_result(cli.json, client.call("readlink", json!({ "path": path })).await?),
		Cmd::Realpath { path } => print_result(cli.json, client.call("realpath", json!({ "path": path })).await?),
		Cmd::Chmod { path, mode } => {
			let mode = i64::from_str_radix(mode.trim_start_matches("0o"), 8)
				.map_err(|_| anyhow::anyhow!("mode must be an octal number, e.g. 0755"))?;
			client.call("chmod", json!({ "path": path, "mode": mode })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
		Cmd::Chown { path, uid, gid } => {
			client.call("chown", json!({ "path": path, "uid": uid, "gid": gid })).await?;
			if !cli.json {
				println!("{}", "ok".green());
			}
		}
	}

	Ok(())
}

fn print_result(as_json: bool, value: Value) {
	if as_json {
		print_json(&value);
	} else {
		match &value {
			Value::Object(_) => print_json(&value),
			Value::Null => println!("{}", "ok".green()),
			other => println!("{other}"),
		}
	}
}

fn print_json(value: &Value) {
	println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string()));
}

fn print_listing(result: &Value) {
	let entries = match result.as_array() {
		Some(entries) => entries,
		None => {
			print_json(result);
			return;
		}
	};

	let mut table = Table::new();
	table.load_preset(UTF8_BORDERS_ONLY).set_header(vec!["name", "kind", "path"]);

	for entry in entries {
		let name = entry.get("name").and_then(Value::as_str).unwrap_or("?");
		let kind = entry.get("kind").and_then(Value::as_str).unwrap_or("-");
		let path = entry.get("path").and_then(Value::as_str).unwrap_or("?");
		table.add_row(vec![Cell::new(name), Cell::new(kind), Cell::new(path)]);
	}

	println!("{table}");
}

struct RpcClient {
	http: reqwest::Client,
	base: String,
}

impl RpcClient {
	fn new(base: String) -> Self {
		Self { http: reqwest::Client::new(), base }
	}

	async fn call(&self, method: &str, params: Value) -> Result<Value> {
		let response = self
			.http
			.post(format!("{}/rpc", self.base))
			.json(&json!({ "method": method, "params": params }))
			.send()
			.await?;

		let body: Value = response.json().await?;
		if let Some(error) = body.get("error") {
			let code = error.get("code").and_then(Value::as_str).unwrap_or("UNKNOWN");
			let message = error.get("message").and_then(Value::as_str).unwrap_or("request failed");
			bail!("{}: {}", code.red(), message);
		}
		Ok(body.get("result").cloned().unwrap_or(Value::Null))
	}
}
