//! Wire frames for the watch endpoint (spec §6.3). Kept as plain
//! `serde_json::Value` builders rather than one tagged enum, since the
//! `event` frame's `type` discriminant is the underlying [`ChangeEvent`]'s
//! own `create|modify|delete|rename` tag, not a `frame kind` tag shared
//! with `welcome`/`ping`/etc.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::ChangeEvent;

pub enum ServerFrame {
	Welcome {
		connection_id: Uuid,
		heartbeat_interval_ms: u64,
		connection_timeout_ms: u64,
		connected_at_ms: i64,
	},
	Ping {
		timestamp: i64,
	},
	Pong {
		timestamp: i64,
	},
	Subscribed {
		path: String,
	},
	Unsubscribed {
		path: String,
	},
	Event(ChangeEvent),
	Error {
		message: String,
		code: String,
	},
}

impl ServerFrame {
	pub fn to_json(&self) -> Value {
		match self {
			ServerFrame::Welcome {
				connection_id,
				heartbeat_interval_ms,
				connection_timeout_ms,
				connected_at_ms,
			} => json!({
				"type": "welcome",
				"connectionId": connection_id.to_string(),
				"heartbeatInterval": heartbeat_interval_ms,
				"connectionTimeout": connection_timeout_ms,
				"connectedAt": connected_at_ms,
			}),
			ServerFrame::Ping { timestamp } => json!({"type": "ping", "timestamp": timestamp}),
			ServerFrame::Pong { timestamp } => json!({"type": "pong", "timestamp": timestamp}),
			ServerFrame::Subscribed { path } => json!({"type": "subscribed", "path": path}),
			ServerFrame::Unsubscribed { path } => json!({"type": "unsubscribed", "path": path}),
			ServerFrame::Event(ev) => serde_json::to_value(ev).unwrap_or(Value::Null),
			ServerFrame::Error { message, code } => {
				json!({"type": "error", "message": message, "code": code})
			}
		}
	}
}

#[derive(Debug, Clone)]
pub enum ClientFrame {
	Subscribe { path: String, recursive: bool },
	Unsubscribe { path: Option<String> },
	Ping,
	Pong { timestamp: i64 },
}

impl ClientFrame {
	pub fn parse(raw: &str) -> Option<ClientFrame> {
		let v: Value = serde_json::from_str(raw).ok()?;
		let ty = v.get("type")?.as_str()?;
		match ty {
			"subscribe" => Some(ClientFrame::Subscribe {
				path: v.get("path")?.as_str()?.to_string(),
				recursive: v.get("recursive").and_then(Value::as_bool).unwrap_or(false),
			}),
			"unsubscribe" => Some(ClientFrame::Unsubscribe {
				path: v.get("path").and_then(Value::as_str).map(str::to_string),
			}),
			"ping" => Some(ClientFrame::Ping),
			"pong" => Some(ClientFrame::Pong {
				timestamp: v.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
			}),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_subscribe_with_recursive() {
		let f = ClientFrame::parse(r#"{"type":"subscribe","path":"/a","recursive":true}"#).unwrap();
		assert!(matches!(f, ClientFrame::Subscribe { path, recursive: true } if path == "/a"));
	}

	#[test]
	fn unsubscribe_without_path_means_close() {
		let f = ClientFrame::parse(r#"{"type":"unsubscribe"}"#).unwrap();
		assert!(matches!(f, ClientFrame::Unsubscribe { path: None }));
	}

	#[test]
	fn welcome_frame_shape() {
		let frame = ServerFrame::Welcome {
			connection_id: Uuid::nil(),
			heartbeat_interval_ms: 30_000,
			connection_timeout_ms: 90_000,
			connected_at_ms: 0,
		};
		let v = frame.to_json();
		assert_eq!(v["type"], "welcome");
		assert_eq!(v["heartbeatInterval"], 30_000);
	}
}
