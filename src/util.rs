//! Small shared helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as integer milliseconds (spec §3.1 timestamps).
pub fn now_ms() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as i64
}
