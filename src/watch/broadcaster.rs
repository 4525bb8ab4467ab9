//! Watch Broadcaster (spec §4.6): event ingestion, coalescing, batching,
//! rate-limited delivery, heartbeat/liveness.
//!
//! Runs as its own cooperating task consuming the engine's raw change-event
//! broadcast channel, never touching engine state directly across a
//! suspension point (spec §5).

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::{ChangeEvent, ChangeKind};
use crate::error::{FsError, FsResult};
use crate::util::now_ms;
use crate::watch::frame::ServerFrame;
use crate::watch::rate_limit::{RateLimitConfig, SlidingWindowRateLimiter};
use crate::watch::subscription::{SubscriptionIndex, DEFAULT_SUBSCRIPTION_CAP};

#[derive(Debug, Clone, Copy)]
pub struct BroadcasterConfig {
	pub batch_window_ms: u64,
	pub max_batch_size: usize,
	pub heartbeat_interval_ms: u64,
	pub missed_pong_limit: u32,
	pub stale_after_ms: i64,
	pub connection_cap: usize,
	pub subscription_cap: usize,
	pub outbound_channel_capacity: usize,
	pub rate_limit: RateLimitConfig,
}

impl Default for BroadcasterConfig {
	fn default() -> Self {
		Self {
			batch_window_ms: 10,
			max_batch_size: 50,
			heartbeat_interval_ms: 30_000,
			missed_pong_limit: 3,
			stale_after_ms: 90_000,
			connection_cap: 1000,
			subscription_cap: DEFAULT_SUBSCRIPTION_CAP,
			outbound_channel_capacity: 64,
			rate_limit: RateLimitConfig::default(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
	Connecting,
	Open,
	Closing,
	Closed,
}

struct SubscriberHandle {
	state: Mutex<SubscriberState>,
	last_activity_ms: AtomicI64,
	last_ping_sent_ms: AtomicI64,
	missed_pongs: AtomicU32,
	outbound: mpsc::Sender<Value>,
	rate_limiter: Mutex<SlidingWindowRateLimiter>,
}

struct PendingEvent {
	event: ChangeEvent,
	first_seen_ms: i64,
}

/// The coalescing table in spec §4.6. Pairs not listed there default to
/// the newer event winning outright.
fn coalesce_kind(existing: ChangeKind, new: ChangeKind) -> ChangeKind {
	match new {
		ChangeKind::Delete => ChangeKind::Delete,
		ChangeKind::Modify => match existing {
			ChangeKind::Create => ChangeKind::Create,
			ChangeKind::Rename => ChangeKind::Rename,
			_ => ChangeKind::Modify,
		},
		other => other,
	}
}

fn priority(kind: ChangeKind) -> u8 {
	match kind {
		ChangeKind::Delete => 0,
		ChangeKind::Rename => 1,
		ChangeKind::Create => 2,
		ChangeKind::Modify => 3,
	}
}

fn merge_event(existing: &ChangeEvent, new: &ChangeEvent, kind: ChangeKind) -> ChangeEvent {
	ChangeEvent {
		kind,
		path: new.path.clone(),
		old_path: existing.old_path.clone().or_else(|| new.old_path.clone()),
		size: new.size.or(existing.size),
		is_directory: new.is_directory.or(existing.is_directory),
		mtime: new.mtime,
	}
}

pub struct WatchBroadcaster {
	config: BroadcasterConfig,
	subscriptions: SubscriptionIndex,
	subscribers: RwLock<HashMap<Uuid, Arc<SubscriberHandle>>>,
	pending: Mutex<HashMap<String, PendingEvent>>,
	flush_notify: Notify,
}

impl WatchBroadcaster {
	pub fn new(config: BroadcasterConfig) -> Self {
		let subscriptions = SubscriptionIndex::new(config.subscription_cap);
		Self {
			config,
			subscriptions,
			subscribers: RwLock::new(HashMap::new()),
			pending: Mutex::new(HashMap::new()),
			flush_notify: Notify::new(),
		}
	}

	/// Accept a new subscriber connection, returning its id and the
	/// receiver half the transport layer should drain. Sends the welcome
	/// frame as the first queued message (spec §4.6).
	pub fn register(&self) -> FsResult<(Uuid, mpsc::Receiver<Value>)> {
		if self.subscribers.read().len() >= self.config.connection_cap {
			return Err(FsError::ResourceExhausted {
				reason: "watch connection cap reached".to_string(),
			});
		}

		let id = Uuid::new_v4();
		let (tx, rx) = mpsc::channel(self.config.outbound_channel_capacity);
		let now = now_ms();
		let handle = Arc::new(SubscriberHandle {
			state: Mutex::new(SubscriberState::Open),
			last_activity_ms: AtomicI64::new(now),
			last_ping_sent_ms: AtomicI64::new(0),
			missed_pongs: AtomicU32::new(0),
			outbound: tx.clone(),
			rate_limiter: Mutex::new(SlidingWindowRateLimiter::new(self.config.rate_limit)),
		});
		self.subscribers.write().insert(id, handle);

		let welcome = ServerFrame::Welcome {
			connection_id: id,
			heartbeat_interval_ms: self.config.heartbeat_interval_ms,
			connection_timeout_ms: self.config.stale_after_ms as u64,
			connected_at_ms: now,
		};
		let _ = tx.try_send(welcome.to_json());
		Ok((id, rx))
	}

	pub fn subscribe(&self, sub: Uuid, path: &str, recursive: bool) -> FsResult<()> {
		let stored = self
			.subscriptions
			.subscribe(sub, path, recursive)
			.map_err(|_| FsError::ResourceExhausted {
				reason: "subscription cap reached".to_string(),
			})?;
		self.send_to(sub, ServerFrame::Subscribed { path: stored });
		Ok(())
	}

	/// `path: None` means close the connection entirely (spec §6.3).
	pub fn unsubscribe(&self, sub: Uuid, path: Option<&str>) {
		match path {
			Some(p) => {
				self.subscriptions.unsubscribe(sub, p);
				self.send_to(sub, ServerFrame::Unsubscribed { path: p.to_string() });
			}
			None => self.close_subscriber(sub, "client requested close"),
		}
	}

	pub fn touch_activity(&self, sub: Uuid) {
		if let Some(handle) = self.subscribers.read().get(&sub) {
			handle.last_activity_ms.store(now_ms(), Ordering::SeqCst);
		}
	}

	pub fn on_pong(&self, sub: Uuid) {
		if let Some(handle) = self.subscribers.read().get(&sub) {
			handle.missed_pongs.store(0, Ordering::SeqCst);
			handle.last_activity_ms.store(now_ms(), Ordering::SeqCst);
		}
	}

	pub fn on_client_ping(&self, sub: Uuid) {
		self.touch_activity(sub);
		self.send_to(sub, ServerFrame::Pong { timestamp: now_ms() });
	}

	fn send_to(&self, sub: Uuid, frame: ServerFrame) {
		if let Some(handle) = self.subscribers.read().get(&sub) {
			let _ = handle.outbound.try_send(frame.to_json());
		}
	}

	/// Queue a raw engine event for coalescing; flips the batch-flush timer
	/// early once `maxBatchSize` pending paths accumulate (spec §4.6).
	pub fn queue_event(&self, event: ChangeEvent) {
		let mut pending = self.pending.lock();
		let now = now_ms();
		match pending.get_mut(&event.path) {
			Some(existing) => {
				let kind = coalesce_kind(existing.event.kind, event.kind);
				existing.event = merge_event(&existing.event, &event, kind);
			}
			None => {
				pending.insert(
					event.path.clone(),
					PendingEvent {
						event,
						first_seen_ms: now,
					},
				);
			}
		}
		let should_flush_now = pending.len() >= self.config.max_batch_size;
		drop(pending);
		if should_flush_now {
			self.flush_notify.notify_one();
		}
	}

	/// Drain the pending map, priority-sort, and deliver to matching,
	/// rate-limit-permitting subscribers.
	pub fn flush(&self) {
		let batch: Vec<PendingEvent> = {
			let mut pending = self.pending.lock();
			if pending.is_empty() {
				return;
			}
			let mut events: Vec<PendingEvent> = std::mem::take(&mut *pending).into_values().collect();
			events.sort_by_key(|p| priority(p.event.kind));
			events
		};
		let now = now_ms();
		for pending in &batch {
			debug!(path = %pending.event.path, latency_ms = now - pending.first_seen_ms, "flushing coalesced event");
			self.deliver(&pending.event);
		}
	}

	fn deliver(&self, event: &ChangeEvent) {
		let subscriber_ids = self.subscriptions.subscribers_for_path(&event.path);
		if subscriber_ids.is_empty() {
			return;
		}
		let now = now_ms();
		let subscribers = self.subscribers.read();
		for id in subscriber_ids {
			let Some(handle) = subscribers.get(&id) else {
				continue;
			};
			let allowed = handle.rate_limiter.lock().check_and_record(now);
			match allowed {
				Ok(()) => {
					let frame = ServerFrame::Event(event.clone()).to_json();
					if handle.outbound.try_send(frame).is_err() {
						debug!(subscriber = %id, "outbound channel full or closed, dropping event");
					}
				}
				Err(limited) => {
					debug!(subscriber = %id, retry_after_ms = limited.retry_after_ms, is_burst = limited.is_burst, "rate limited subscriber, dropping event");
				}
			}
		}
	}

	/// Stale-connection sweep (spec §4.6 heartbeat): closes subscribers
	/// past the missed-pong or last-activity thresholds, otherwise sends a
	/// ping and increments the missed-pong counter.
	fn run_heartbeat(&self) {
		let now = now_ms();
		let mut to_close = Vec::new();
		let mut to_ping = Vec::new();
		{
			let subscribers = self.subscribers.read();
			for (id, handle) in subscribers.iter() {
				if *handle.state.lock() != SubscriberState::Open {
					continue;
				}
				let missed = handle.missed_pongs.load(Ordering::SeqCst);
				let last_activity = handle.last_activity_ms.load(Ordering::SeqCst);
				if missed >= self.config.missed_pong_limit || now - last_activity > self.config.stale_after_ms {
					to_close.push(*id);
				} else {
					to_ping.push(*id);
				}
			}
		}

		for id in to_ping {
			self.send_to(id, ServerFrame::Ping { timestamp: now });
			if let Some(handle) = self.subscribers.read().get(&id) {
				handle.last_ping_sent_ms.store(now, Ordering::SeqCst);
				handle.missed_pongs.fetch_add(1, Ordering::SeqCst);
			}
		}
		for id in to_close {
			self.close_subscriber(id, "stale");
		}
	}

	fn close_subscriber(&self, id: Uuid, reason: &str) {
		let removed = self.subscribers.write().remove(&id);
		if let Some(handle) = removed {
			*handle.state.lock() = SubscriberState::Closed;
			let frame = ServerFrame::Error {
				message: format!("connection closed: {reason}"),
				code: "CONNECTION_STALE".to_string(),
			};
			let _ = handle.outbound.try_send(frame.to_json());
		}
		self.subscriptions.remove_subscriber(id);
	}

	async fn flush_loop(&self) {
		loop {
			tokio::select! {
				_ = tokio::time::sleep(Duration::from_millis(self.config.batch_window_ms)) => {},
				_ = self.flush_notify.notified() => {},
			}
			self.flush();
		}
	}

	async fn heartbeat_loop(&self) {
		loop {
			tokio::time::sleep(Duration::from_millis(self.config.heartbeat_interval_ms)).await;
			self.run_heartbeat();
		}
	}

	/// Drive the broadcaster to completion: ingests raw engine events until
	/// the upstream channel closes, while the flush and heartbeat timers
	/// run as cooperating sibling tasks (spec §5).
	pub async fn run(self: Arc<Self>, mut events_rx: broadcast::Receiver<ChangeEvent>) {
		let flush_task = {
			let this = self.clone();
			tokio::spawn(async move { this.flush_loop().await })
		};
		let heartbeat_task = {
			let this = self.clone();
			tokio::spawn(async move { this.heartbeat_loop().await })
		};

		loop {
			match events_rx.recv().await {
				Ok(event) => self.queue_event(event),
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!(skipped, "watch broadcaster lagged behind engine events");
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}

		flush_task.abort();
		heartbeat_task.abort();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn event(path: &str, kind: ChangeKind) -> ChangeEvent {
		ChangeEvent {
			kind,
			path: path.to_string(),
			old_path: None,
			size: None,
			is_directory: Some(false),
			mtime: 0,
		}
	}

	#[test]
	fn coalesces_create_then_modify_to_create() {
		assert_eq!(coalesce_kind(ChangeKind::Create, ChangeKind::Modify), ChangeKind::Create);
	}

	#[test]
	fn coalesces_anything_then_delete_to_delete() {
		assert_eq!(coalesce_kind(ChangeKind::Create, ChangeKind::Delete), ChangeKind::Delete);
		assert_eq!(coalesce_kind(ChangeKind::Modify, ChangeKind::Delete), ChangeKind::Delete);
		assert_eq!(coalesce_kind(ChangeKind::Rename, ChangeKind::Delete), ChangeKind::Delete);
	}

	#[test]
	fn coalesces_rename_then_modify_to_rename() {
		assert_eq!(coalesce_kind(ChangeKind::Rename, ChangeKind::Modify), ChangeKind::Rename);
	}

	#[test]
	fn priority_sorts_delete_before_create_before_modify() {
		let mut kinds = vec![ChangeKind::Modify, ChangeKind::Create, ChangeKind::Delete, ChangeKind::Rename];
		kinds.sort_by_key(|k| priority(*k));
		assert_eq!(
			kinds,
			vec![ChangeKind::Delete, ChangeKind::Rename, ChangeKind::Create, ChangeKind::Modify]
		);
	}

	#[test]
	fn watch_coalescing_scenario_matches_spec() {
		// One subscriber on /d/**, four rapid mutations under /d.
		let broadcaster = WatchBroadcaster::new(BroadcasterConfig::default());
		let (sub, mut rx) = broadcaster.register().unwrap();
		broadcaster.subscribe(sub, "/d/**", false).unwrap();
		let _ = rx.try_recv(); // drain welcome
		let _ = rx.try_recv(); // drain subscribed

		broadcaster.queue_event(event("/d/a", ChangeKind::Create));
		broadcaster.queue_event(event("/d/a", ChangeKind::Modify));
		broadcaster.queue_event(event("/d/b", ChangeKind::Modify));
		broadcaster.queue_event(event("/d/a", ChangeKind::Delete));
		broadcaster.flush();

		let mut received = Vec::new();
		while let Ok(frame) = rx.try_recv() {
			received.push(frame);
		}
		assert_eq!(received.len(), 2);
		assert_eq!(received[0]["type"], "delete");
		assert_eq!(received[0]["path"], "/d/a");
		assert_eq!(received[1]["type"], "modify");
		assert_eq!(received[1]["path"], "/d/b");
	}

	#[test]
	fn connection_cap_refuses_further_registration() {
		let broadcaster = WatchBroadcaster::new(BroadcasterConfig {
			connection_cap: 1,
			..Default::default()
		});
		broadcaster.register().unwrap();
		assert!(broadcaster.register().is_err());
	}
}
