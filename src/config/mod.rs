//! Service configuration: versioned, lazily created on first run, following
//! the `AppConfig::load_or_create`/migrate pattern the teacher uses for its
//! own top-level config (`config::app_config::AppConfig`).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::blob::DEFAULT_HOT_THRESHOLD;
use crate::engine::orphan::OrphanCleanupConfig;
use crate::watch::{BroadcasterConfig, RateLimitConfig};

const CONFIG_FILE_NAME: &str = "vfsd.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
	pub version: u32,
	pub data_dir: PathBuf,
	pub jail_root: String,
	pub log_level: String,
	pub hot_tier_threshold_bytes: u64,
	pub warm_dir: Option<PathBuf>,
	pub cold_dir: Option<PathBuf>,
	pub orphan_cleanup: OrphanCleanupSettings,
	pub broadcaster: BroadcasterSettings,
	pub http_bind: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrphanCleanupSettings {
	pub min_orphan_count: u64,
	pub min_orphan_age_ms: i64,
	pub batch_size: u64,
	pub run_async: bool,
}

impl Default for OrphanCleanupSettings {
	fn default() -> Self {
		let d = OrphanCleanupConfig::default();
		Self {
			min_orphan_count: d.min_orphan_count,
			min_orphan_age_ms: d.min_orphan_age_ms,
			batch_size: d.batch_size,
			run_async: d.r#async,
		}
	}
}

impl From<OrphanCleanupSettings> for OrphanCleanupConfig {
	fn from(s: OrphanCleanupSettings) -> Self {
		Self {
			min_orphan_count: s.min_orphan_count,
			min_orphan_age_ms: s.min_orphan_age_ms,
			batch_size: s.batch_size,
			r#async: s.run_async,
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BroadcasterSettings {
	pub batch_window_ms: u64,
	pub max_batch_size: usize,
	pub heartbeat_interval_ms: u64,
	pub missed_pong_limit: u32,
	pub stale_after_ms: i64,
	pub connection_cap: usize,
	pub subscription_cap: usize,
	pub rate_window_ms: i64,
	pub rate_max_messages: usize,
	pub rate_burst_window_ms: i64,
	pub rate_burst_max_messages: usize,
}

impl Default for BroadcasterSettings {
	fn default() -> Self {
		let d = BroadcasterConfig::default();
		Self {
			batch_window_ms: d.batch_window_ms,
			max_batch_size: d.max_batch_size,
			heartbeat_interval_ms: d.heartbeat_interval_ms,
			missed_pong_limit: d.missed_pong_limit,
			stale_after_ms: d.stale_after_ms,
			connection_cap: d.connection_cap,
			subscription_cap: d.subscription_cap,
			rate_window_ms: d.rate_limit.window_ms,
			rate_max_messages: d.rate_limit.max_messages,
			rate_burst_window_ms: d.rate_limit.burst_window_ms,
			rate_burst_max_messages: d.rate_limit.burst_max_messages,
		}
	}
}

impl From<BroadcasterSettings> for BroadcasterConfig {
	fn from(s: BroadcasterSettings) -> Self {
		let defaults = BroadcasterConfig::default();
		Self {
			batch_window_ms: s.batch_window_ms,
			max_batch_size: s.max_batch_size,
			heartbeat_interval_ms: s.heartbeat_interval_ms,
			missed_pong_limit: s.missed_pong_limit,
			stale_after_ms: s.stale_after_ms,
			connection_cap: s.connection_cap,
			subscription_cap: s.subscription_cap,
			rate_limit: RateLimitConfig {
				window_ms: s.rate_window_ms,
				max_messages: s.rate_max_messages,
				burst_window_ms: s.rate_burst_window_ms,
				burst_max_messages: s.rate_burst_max_messages,
			},
			..defaults
		}
	}
}

impl ServiceConfig {
	const TARGET_VERSION: u32 = 1;

	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		Self {
			version: Self::TARGET_VERSION,
			data_dir,
			jail_root: "/".to_string(),
			log_level: "info".to_string(),
			hot_tier_threshold_bytes: DEFAULT_HOT_THRESHOLD,
			warm_dir: None,
			cold_dir: None,
			orphan_cleanup: OrphanCleanupSettings::default(),
			broadcaster: BroadcasterSettings::default(),
			http_bind: "127.0.0.1:7864".to_string(),
		}
	}

	/// Load from `data_dir/vfsd.toml`, creating a default file if absent,
	/// and migrating forward if the on-disk version is behind.
	pub fn load_or_create(data_dir: &Path) -> Result<Self> {
		let config_path = data_dir.join(CONFIG_FILE_NAME);

		if config_path.exists() {
			info!(path = %config_path.display(), "loading service config");
			let raw = std::fs::read_to_string(&config_path)?;
			let mut config: ServiceConfig = toml::from_str(&raw)?;
			if config.version < Self::TARGET_VERSION {
				info!(from = config.version, to = Self::TARGET_VERSION, "migrating service config");
				config.migrate()?;
				config.save()?;
			}
			Ok(config)
		} else {
			warn!(path = %config_path.display(), "no service config found, writing defaults");
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			Ok(config)
		}
	}

	fn migrate(&mut self) -> Result<()> {
		match self.version {
			1 => Ok(()),
			v => Err(anyhow!("unknown service config version: {v}")),
		}
	}

	pub fn save(&self) -> Result<()> {
		std::fs::create_dir_all(&self.data_dir)?;
		let config_path = self.data_dir.join(CONFIG_FILE_NAME);
		let rendered = toml::to_string_pretty(self)?;
		std::fs::write(&config_path, rendered)?;
		Ok(())
	}

	pub fn db_path(&self) -> PathBuf {
		self.data_dir.join("metadata.sqlite")
	}
}

impl Default for ServiceConfig {
	fn default() -> Self {
		let data_dir = dirs::data_dir()
			.map(|d| d.join("vfsd"))
			.unwrap_or_else(|| PathBuf::from("./vfsd-data"));
		Self::default_with_dir(data_dir)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn load_or_create_writes_default_then_reloads() {
		let dir = tempfile::tempdir().unwrap();
		let first = ServiceConfig::load_or_create(dir.path()).unwrap();
		assert_eq!(first.version, ServiceConfig::TARGET_VERSION);
		assert!(dir.path().join(CONFIG_FILE_NAME).exists());

		let second = ServiceConfig::load_or_create(dir.path()).unwrap();
		assert_eq!(second.http_bind, first.http_bind);
	}
}
