//! Configuration for the ledger indexer
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or no file at all) yields
//! a configuration that indexes a local gateway into the in-memory store.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Failed to read config file {path}: {source}")]
	Read {
		path: String,
		source: std::io::Error,
	},

	#[error("TOML parsing error: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("Invalid configuration: {0}")]
	Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
	#[serde(default = "default_ledger_url")]
	pub url: String,
	#[serde(default = "default_ledger_timeout")]
	pub request_timeout_secs: u64,
	#[serde(default = "default_page_limit")]
	pub page_limit: u32,
}

fn default_ledger_url() -> String {
	"http://localhost:1317".to_string()
}

const fn default_ledger_timeout() -> u64 {
	15
}

const fn default_page_limit() -> u32 {
	100
}

impl Default for LedgerConfig {
	fn default() -> Self {
		Self {
			url: default_ledger_url(),
			request_timeout_secs: default_ledger_timeout(),
			page_limit: default_page_limit(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
	/// `memory://` or a `postgres://` connection string
	#[serde(default = "default_database_url")]
	pub url: String,
	#[serde(default = "default_max_connections")]
	pub max_connections: u32,
	#[serde(default = "default_min_connections")]
	pub min_connections: u32,
	#[serde(default = "default_connect_timeout")]
	pub connect_timeout_secs: u64,
}

fn default_database_url() -> String {
	"memory://".to_string()
}

const fn default_max_connections() -> u32 {
	10
}

const fn default_min_connections() -> u32 {
	1
}

const fn default_connect_timeout() -> u64 {
	10
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: default_database_url(),
			max_connections: default_max_connections(),
			min_connections: default_min_connections(),
			connect_timeout_secs: default_connect_timeout(),
		}
	}
}

impl DatabaseConfig {
	#[must_use]
	pub fn is_memory(&self) -> bool {
		self.url.starts_with("memory://")
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
	/// First height to ingest when the store has no checkpoint
	#[serde(default = "default_start_height")]
	pub start_height: u64,
	/// Heights ingested per outer loop iteration
	#[serde(default = "default_sync_batch_size")]
	pub batch_size: u64,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Sleep after a failed block before retrying the same height
	#[serde(default = "default_recovery_interval_ms")]
	pub recovery_interval_ms: u64,
	#[serde(default = "default_lease_name")]
	pub lease_name: String,
	/// Bech32 human-readable part of ledger account addresses
	#[serde(default = "default_address_prefix")]
	pub address_prefix: String,
	#[serde(default = "default_event_buffer")]
	pub event_buffer: usize,
}

const fn default_start_height() -> u64 {
	1
}

const fn default_sync_batch_size() -> u64 {
	20
}

const fn default_poll_interval_ms() -> u64 {
	2000
}

const fn default_recovery_interval_ms() -> u64 {
	5000
}

fn default_lease_name() -> String {
	"ledger-indexer-sync".to_string()
}

fn default_address_prefix() -> String {
	"hub".to_string()
}

const fn default_event_buffer() -> usize {
	1024
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			start_height: default_start_height(),
			batch_size: default_sync_batch_size(),
			poll_interval_ms: default_poll_interval_ms(),
			recovery_interval_ms: default_recovery_interval_ms(),
			lease_name: default_lease_name(),
			address_prefix: default_address_prefix(),
			event_buffer: default_event_buffer(),
		}
	}
}

impl SyncConfig {
	#[must_use]
	pub const fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	#[must_use]
	pub const fn recovery_interval(&self) -> Duration {
		Duration::from_millis(self.recovery_interval_ms)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
	#[serde(default = "default_enabled")]
	pub enabled: bool,
	#[serde(default = "default_decode_url")]
	pub decode_url: String,
	#[serde(default = "default_enrichment_batch_size")]
	pub batch_size: usize,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_enrichment_poll_secs")]
	pub poll_interval_secs: u64,
	#[serde(default = "default_decode_timeout")]
	pub request_timeout_secs: u64,
	/// Records decoded concurrently within one batch
	#[serde(default = "default_concurrency")]
	pub concurrency: usize,
}

const fn default_enabled() -> bool {
	true
}

fn default_decode_url() -> String {
	"http://localhost:3000/decode".to_string()
}

const fn default_enrichment_batch_size() -> usize {
	25
}

const fn default_max_attempts() -> u32 {
	5
}

const fn default_enrichment_poll_secs() -> u64 {
	10
}

const fn default_decode_timeout() -> u64 {
	20
}

const fn default_concurrency() -> usize {
	1
}

impl Default for EnrichmentConfig {
	fn default() -> Self {
		Self {
			enabled: default_enabled(),
			decode_url: default_decode_url(),
			batch_size: default_enrichment_batch_size(),
			max_attempts: default_max_attempts(),
			poll_interval_secs: default_enrichment_poll_secs(),
			request_timeout_secs: default_decode_timeout(),
			concurrency: default_concurrency(),
		}
	}
}

impl EnrichmentConfig {
	#[must_use]
	pub const fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_secs)
	}

	#[must_use]
	pub const fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
	#[serde(default = "default_log_level")]
	pub level: String,
	#[serde(default)]
	pub json: bool,
}

fn default_log_level() -> String {
	"info".to_string()
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: default_log_level(),
			json: false,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
	#[serde(default)]
	pub ledger: LedgerConfig,
	#[serde(default)]
	pub database: DatabaseConfig,
	#[serde(default)]
	pub sync: SyncConfig,
	#[serde(default)]
	pub enrichment: EnrichmentConfig,
	#[serde(default)]
	pub logging: LoggingConfig,
}

impl AppConfig {
	/// Parse configuration from TOML text and validate it.
	pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	/// Load configuration from a file.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.display().to_string(),
			source,
		})?;
		Self::from_toml(&content)
	}

	/// Load `path` if it exists, otherwise fall back to the defaults.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		if path.as_ref().exists() {
			Self::from_file(path)
		} else {
			let config = Self::default();
			config.validate()?;
			Ok(config)
		}
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.sync.batch_size == 0 {
			return Err(ConfigError::Invalid("sync.batch_size must be at least 1".into()));
		}
		if self.sync.start_height == 0 {
			return Err(ConfigError::Invalid("sync.start_height must be at least 1".into()));
		}
		if self.sync.address_prefix.is_empty() {
			return Err(ConfigError::Invalid("sync.address_prefix must not be empty".into()));
		}
		if self.enrichment.max_attempts == 0 {
			return Err(ConfigError::Invalid(
				"enrichment.max_attempts must be at least 1".into(),
			));
		}
		if self.enrichment.batch_size == 0 || self.enrichment.concurrency == 0 {
			return Err(ConfigError::Invalid(
				"enrichment.batch_size and enrichment.concurrency must be at least 1".into(),
			));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn empty_file_yields_defaults() {
		let config = AppConfig::from_toml("").unwrap();
		assert!(config.database.is_memory());
		assert_eq!(config.sync.start_height, 1);
		assert_eq!(config.enrichment.max_attempts, 5);
		assert_eq!(config.enrichment.poll_interval(), Duration::from_secs(10));
	}

	#[test]
	fn partial_sections_keep_remaining_defaults() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[sync]
batch_size = 5
address_prefix = "cosmos"

[database]
url = "postgres://indexer@localhost/ledger"
"#
		)
		.unwrap();

		let config = AppConfig::from_file(file.path()).unwrap();
		assert_eq!(config.sync.batch_size, 5);
		assert_eq!(config.sync.address_prefix, "cosmos");
		assert_eq!(config.sync.poll_interval_ms, 2000);
		assert!(!config.database.is_memory());
		assert_eq!(config.database.max_connections, 10);
	}

	#[test]
	fn rejects_zero_batch_size() {
		let err = AppConfig::from_toml("[sync]\nbatch_size = 0\n").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid(_)));
	}

	#[test]
	fn missing_file_falls_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let config = AppConfig::load(dir.path().join("absent.toml")).unwrap();
		assert_eq!(config.ledger.url, "http://localhost:1317");
	}
}
