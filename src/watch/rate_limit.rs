//! Sliding-window + burst rate limiter, keyed per subscriber (spec §4.6).

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
	pub window_ms: i64,
	pub max_messages: usize,
	pub burst_window_ms: i64,
	pub burst_max_messages: usize,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			window_ms: 1000,
			max_messages: 100,
			burst_window_ms: 100,
			burst_max_messages: 20,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
	pub retry_after_ms: u64,
	pub is_burst: bool,
}

/// Tracks recent send timestamps for one subscriber and decides whether a
/// new send is allowed under either the window or burst limit.
pub struct SlidingWindowRateLimiter {
	config: RateLimitConfig,
	sends: VecDeque<i64>,
}

impl SlidingWindowRateLimiter {
	pub fn new(config: RateLimitConfig) -> Self {
		Self {
			config,
			sends: VecDeque::new(),
		}
	}

	/// Prune timestamps older than the widest window, then check both
	/// thresholds. Records the send only if permitted.
	pub fn check_and_record(&mut self, now_ms: i64) -> Result<(), RateLimited> {
		let cutoff = now_ms - self.config.window_ms.max(self.config.burst_window_ms);
		while matches!(self.sends.front(), Some(t) if *t < cutoff) {
			self.sends.pop_front();
		}

		let burst_count = self
			.sends
			.iter()
			.filter(|t| **t >= now_ms - self.config.burst_window_ms)
			.count();
		if burst_count >= self.config.burst_max_messages {
			return Err(RateLimited {
				retry_after_ms: self.config.burst_window_ms as u64,
				is_burst: true,
			});
		}

		let window_count = self
			.sends
			.iter()
			.filter(|t| **t >= now_ms - self.config.window_ms)
			.count();
		if window_count >= self.config.max_messages {
			return Err(RateLimited {
				retry_after_ms: self.config.window_ms as u64,
				is_burst: false,
			});
		}

		self.sends.push_back(now_ms);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allows_under_both_thresholds() {
		let mut limiter = SlidingWindowRateLimiter::new(RateLimitConfig::default());
		for i in 0..10 {
			assert!(limiter.check_and_record(1_000_000 + i).is_ok());
		}
	}

	#[test]
	fn burst_limit_trips_before_window_limit() {
		let mut limiter = SlidingWindowRateLimiter::new(RateLimitConfig {
			burst_max_messages: 3,
			..Default::default()
		});
		let base = 5_000_000i64;
		for i in 0..3 {
			assert!(limiter.check_and_record(base + i).is_ok());
		}
		let err = limiter.check_and_record(base + 3).unwrap_err();
		assert!(err.is_burst);
		assert!(err.retry_after_ms <= 100);
	}

	#[test]
	fn window_resets_after_elapsed_time() {
		let mut limiter = SlidingWindowRateLimiter::new(RateLimitConfig {
			max_messages: 2,
			burst_max_messages: 100,
			..Default::default()
		});
		let base = 0i64;
		assert!(limiter.check_and_record(base).is_ok());
		assert!(limiter.check_and_record(base + 10).is_ok());
		assert!(limiter.check_and_record(base + 20).is_err());
		// Well past the 1000ms window: allowed again.
		assert!(limiter.check_and_record(base + 2000).is_ok());
	}
}
