//! Subscription Index — maps subscriber handles to glob patterns and back
//! (spec §4.5). The RPC layer's own naive `pathMatchesWatch` is explicitly
//! superseded; this index is the single source of truth for match
//! semantics (spec §9).

use globset::{Glob, GlobMatcher};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

pub const DEFAULT_SUBSCRIPTION_CAP: usize = 100;

#[derive(Clone)]
enum CompiledPattern {
	/// Exact string equality.
	Exact(String),
	/// `dir/**` — matches any path strictly under `dir`.
	RecursiveDir(String),
	/// General glob, also checked against the path's basename so `*.log`
	/// matches `/var/log/app.log` (spec §4.5).
	Glob { raw: String, matcher: GlobMatcher },
}

impl CompiledPattern {
	fn compile(pattern: &str) -> Self {
		if let Some(dir) = pattern.strip_suffix("/**") {
			return CompiledPattern::RecursiveDir(dir.to_string());
		}
		if !pattern.contains(['*', '?', '[']) {
			return CompiledPattern::Exact(pattern.to_string());
		}
		match Glob::new(pattern) {
			Ok(g) => CompiledPattern::Glob {
				raw: pattern.to_string(),
				matcher: g.compile_matcher(),
			},
			Err(_) => CompiledPattern::Exact(pattern.to_string()),
		}
	}

	fn matches(&self, path: &str) -> bool {
		match self {
			CompiledPattern::Exact(p) => p == path,
			CompiledPattern::RecursiveDir(dir) => {
				path == *dir || path.starts_with(&format!("{dir}/"))
			}
			CompiledPattern::Glob { matcher, .. } => {
				if matcher.is_match(path) {
					return true;
				}
				let basename = path.rsplit('/').next().unwrap_or(path);
				matcher.is_match(basename)
			}
		}
	}

	fn raw(&self) -> String {
		match self {
			CompiledPattern::Exact(p) => p.clone(),
			CompiledPattern::RecursiveDir(d) => format!("{d}/**"),
			CompiledPattern::Glob { raw, .. } => raw.clone(),
		}
	}
}

/// Thread-safe O(1)-ish subscribe/unsubscribe, O(subscribers) match lookup.
/// Small subscriber counts are expected per instance; a more elaborate
/// trie is not warranted at this scale.
pub struct SubscriptionIndex {
	cap: usize,
	by_subscriber: RwLock<HashMap<Uuid, Vec<CompiledPattern>>>,
}

impl SubscriptionIndex {
	pub fn new(cap: usize) -> Self {
		Self {
			cap,
			by_subscriber: RwLock::new(HashMap::new()),
		}
	}

	/// Registers `pattern` for `sub`, rewriting a bare path to `path/**`
	/// when `recursive` is set and the input has no glob metacharacters
	/// (spec §4.5). Returns the pattern actually stored.
	pub fn subscribe(&self, sub: Uuid, pattern: &str, recursive: bool) -> Result<String, SubscribeError> {
		let effective = if recursive && !pattern.contains(['*', '?', '[']) {
			format!("{}/**", pattern.trim_end_matches('/'))
		} else {
			pattern.to_string()
		};

		let mut map = self.by_subscriber.write();
		let entry = map.entry(sub).or_default();
		if entry.len() >= self.cap {
			return Err(SubscribeError::CapExceeded);
		}
		entry.push(CompiledPattern::compile(&effective));
		Ok(effective)
	}

	pub fn unsubscribe(&self, sub: Uuid, pattern: &str) -> bool {
		let mut map = self.by_subscriber.write();
		if let Some(patterns) = map.get_mut(&sub) {
			let before = patterns.len();
			patterns.retain(|p| p.raw() != pattern);
			return patterns.len() != before;
		}
		false
	}

	pub fn remove_subscriber(&self, sub: Uuid) {
		self.by_subscriber.write().remove(&sub);
	}

	/// Every subscriber id holding a pattern matching `path`.
	pub fn subscribers_for_path(&self, path: &str) -> Vec<Uuid> {
		self.by_subscriber
			.read()
			.iter()
			.filter(|(_, patterns)| patterns.iter().any(|p| p.matches(path)))
			.map(|(id, _)| *id)
			.collect()
	}

	pub fn subscription_count(&self, sub: Uuid) -> usize {
		self.by_subscriber.read().get(&sub).map(|v| v.len()).unwrap_or(0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeError {
	CapExceeded,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exact_pattern_matches_only_itself() {
		let idx = SubscriptionIndex::new(DEFAULT_SUBSCRIPTION_CAP);
		let sub = Uuid::new_v4();
		idx.subscribe(sub, "/a.txt", false).unwrap();
		assert_eq!(idx.subscribers_for_path("/a.txt"), vec![sub]);
		assert!(idx.subscribers_for_path("/b.txt").is_empty());
	}

	#[test]
	fn recursive_dir_matches_descendants() {
		let idx = SubscriptionIndex::new(DEFAULT_SUBSCRIPTION_CAP);
		let sub = Uuid::new_v4();
		idx.subscribe(sub, "/d/**", false).unwrap();
		assert_eq!(idx.subscribers_for_path("/d/a"), vec![sub]);
		assert_eq!(idx.subscribers_for_path("/d/nested/b"), vec![sub]);
		assert!(idx.subscribers_for_path("/other").is_empty());
	}

	#[test]
	fn recursive_flag_rewrites_bare_path() {
		let idx = SubscriptionIndex::new(DEFAULT_SUBSCRIPTION_CAP);
		let sub = Uuid::new_v4();
		let stored = idx.subscribe(sub, "/d", true).unwrap();
		assert_eq!(stored, "/d/**");
		assert_eq!(idx.subscribers_for_path("/d/a"), vec![sub]);
	}

	#[test]
	fn glob_matches_basename() {
		let idx = SubscriptionIndex::new(DEFAULT_SUBSCRIPTION_CAP);
		let sub = Uuid::new_v4();
		idx.subscribe(sub, "*.log", false).unwrap();
		assert_eq!(idx.subscribers_for_path("/var/log/app.log"), vec![sub]);
	}

	#[test]
	fn cap_exceeded_fails() {
		let idx = SubscriptionIndex::new(1);
		let sub = Uuid::new_v4();
		idx.subscribe(sub, "/a", false).unwrap();
		assert_eq!(idx.subscribe(sub, "/b", false), Err(SubscribeError::CapExceeded));
	}
}
