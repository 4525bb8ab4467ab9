//! Watch endpoint (spec §6.3): upgrades to a duplex message channel that
//! relays [`WatchBroadcaster`] frames and accepts subscribe/unsubscribe
//! commands.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::watch::{ClientFrame, WatchBroadcaster};

#[derive(Clone)]
pub struct WatchState {
	pub broadcaster: Arc<WatchBroadcaster>,
}

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
	pub path: String,
	#[serde(default)]
	pub recursive: bool,
}

const STALE_CLOSE_CODE: u16 = 1008;

pub async fn watch_handler(
	ws: Option<WebSocketUpgrade>,
	State(state): State<WatchState>,
	Query(query): Query<WatchQuery>,
) -> Response {
	let Some(ws) = ws else {
		return StatusCode::UPGRADE_REQUIRED.into_response();
	};
	if !query.path.starts_with('/') {
		return (StatusCode::BAD_REQUEST, "path must be absolute").into_response();
	}

	let (sub_id, rx) = match state.broadcaster.register() {
		Ok(pair) => pair,
		Err(_) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
	};

	if let Err(e) = state.broadcaster.subscribe(sub_id, &query.path, query.recursive) {
		debug!(error = %e, "initial subscribe failed");
	}

	ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster, sub_id, rx))
}

async fn handle_socket(
	socket: WebSocket,
	broadcaster: Arc<WatchBroadcaster>,
	sub_id: uuid::Uuid,
	mut outbound_rx: tokio::sync::mpsc::Receiver<serde_json::Value>,
) {
	use futures::{SinkExt, StreamExt};

	let (mut sender, mut receiver) = socket.split();

	let send_task = tokio::spawn(async move {
		while let Some(frame) = outbound_rx.recv().await {
			if sender.send(Message::Text(frame.to_string())).await.is_err() {
				break;
			}
		}
		let _ = sender
			.send(Message::Close(Some(CloseFrame {
				code: STALE_CLOSE_CODE,
				reason: "subscriber closed".into(),
			})))
			.await;
	});

	while let Some(Ok(msg)) = receiver.next().await {
		match msg {
			Message::Text(text) => {
				broadcaster.touch_activity(sub_id);
				match ClientFrame::parse(&text) {
					Some(ClientFrame::Subscribe { path, recursive }) => {
						let _ = broadcaster.subscribe(sub_id, &path, recursive);
					}
					Some(ClientFrame::Unsubscribe { path }) => {
						broadcaster.unsubscribe(sub_id, path.as_deref());
						if path.is_none() {
							break;
						}
					}
					Some(ClientFrame::Ping) => broadcaster.on_client_ping(sub_id),
					Some(ClientFrame::Pong { .. }) => broadcaster.on_pong(sub_id),
					None => debug!("unrecognized watch client frame"),
				}
			}
			Message::Pong(_) => broadcaster.on_pong(sub_id),
			Message::Ping(_) => broadcaster.touch_activity(sub_id),
			Message::Close(_) => break,
			Message::Binary(_) => {}
		}
	}

	broadcaster.unsubscribe(sub_id, None);
	send_task.abort();
}
