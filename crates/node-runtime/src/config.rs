//! # Node Configuration
//!
//! One TOML document aggregating every subsystem's config, plus environment
//! overrides for deployment secrets and paths.
//!
//! ## Environment Variables
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `FI_CONFIG` | path of the TOML file (optional) |
//! | `FI_RPC_URL` | `rpc.url` |
//! | `FI_RPC_USER` | `rpc.user` |
//! | `FI_RPC_PASSWORD` | `rpc.password` |
//! | `FI_DATA_DIR` | `storage.data_dir` |
//! | `FI_PUBLISH_ADDRESS` | `publish.address` |
//! | `FI_PUBLISH_WIF` | `publish.wif` |
//! | `FI_LOG_LEVEL` | `logging.level` |

use fi_01_chain_sync::ChainSyncConfig;
use fi_02_ancestry::AncestryConfig;
use fi_03_multipart::{ReassemblerConfig, SplitterConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`NodeConfig`].
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Publishing needs both an address and a key, or neither.
    #[error("Publishing needs both publish.address and publish.wif")]
    IncompletePublishing,
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Ledger node RPC.
    pub rpc: RpcConfig,
    /// Index storage.
    pub storage: StorageConfig,
    /// Ledger polling.
    pub notifier: NotifierConfig,
    /// Publishing identity.
    pub publish: PublishConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Chain sync.
    pub chain_sync: ChainSyncConfig,
    /// Unconfirmed-output ancestry.
    pub ancestry: AncestryConfig,
    /// Multipart reassembly.
    pub reassembler: ReassemblerConfig,
    /// Multipart publishing.
    pub splitter: SplitterConfig,
}

impl NodeConfig {
    /// Load from `FI_CONFIG` (if set) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FI_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse TOML text. Missing sections keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FI_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("FI_RPC_URL") {
            self.rpc.url = url;
        }
        if let Some(user) = lookup("FI_RPC_USER") {
            self.rpc.user = Some(user);
        }
        if let Some(password) = lookup("FI_RPC_PASSWORD") {
            self.rpc.password = Some(password);
        }
        if let Some(dir) = lookup("FI_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(address) = lookup("FI_PUBLISH_ADDRESS") {
            self.publish.address = Some(address);
        }
        if let Some(wif) = lookup("FI_PUBLISH_WIF") {
            self.publish.wif = Some(wif);
        }
        if let Some(level) = lookup("FI_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Reject combinations the runtime cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish.address.is_some() != self.publish.wif.is_some() {
            return Err(ConfigError::IncompletePublishing);
        }
        Ok(())
    }

    /// Create a config for testing (in-memory store, fast timers).
    pub fn for_testing() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                commit_interval_ms: 50,
                ..StorageConfig::default()
            },
            notifier: NotifierConfig {
                poll_interval_ms: 50,
                ..NotifierConfig::default()
            },
            chain_sync: ChainSyncConfig::for_testing(),
            ancestry: AncestryConfig::for_testing(),
            reassembler: ReassemblerConfig::for_testing(),
            splitter: SplitterConfig::for_testing(),
            ..Self::default()
        }
    }
}

/// Ledger node JSON-RPC endpoint.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Endpoint URL.
    pub url: String,
    /// Basic-auth user.
    pub user: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Per-request HTTP timeout, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7313".to_string(),
            user: None,
            password: None,
            timeout_ms: 30_000,
        }
    }
}

impl RpcConfig {
    /// HTTP timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl std::fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Which store backs the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; lost on exit.
    #[default]
    Memory,
    /// RocksDB under `data_dir` (needs the `rocksdb` feature).
    Rocksdb,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend.
    pub backend: StorageBackend,
    /// Data directory for durable backends.
    pub data_dir: PathBuf,
    /// Commit cycle period, in milliseconds. Each commit triggers a sweep.
    pub commit_interval_ms: u64,
    /// Event bus channel capacity.
    pub bus_capacity: usize,
    /// Embedded-data messages buffered ahead of the dispatcher. Chain sync
    /// waits once it is full.
    pub dispatch_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
            commit_interval_ms: 5_000,
            bus_capacity: 4_096,
            dispatch_capacity: 1_024,
        }
    }
}

impl StorageConfig {
    /// Commit period.
    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }
}

/// Ledger polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Poll period, in milliseconds.
    pub poll_interval_ms: u64,
    /// Announced headers remembered for reorg detection.
    pub reorg_depth: usize,
    /// Notification channel capacity.
    pub channel_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            reorg_depth: 100,
            channel_capacity: 1_024,
        }
    }
}

impl NotifierConfig {
    /// Poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Publishing identity. Publishing is disabled unless both are set.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Address funding and signing every publish.
    pub address: Option<String>,
    /// WIF private key for `address`.
    pub wif: Option<String>,
}

impl PublishConfig {
    /// Whether publishing is configured.
    pub fn is_enabled(&self) -> bool {
        self.address.is_some() && self.wif.is_some()
    }
}

impl std::fmt::Debug for PublishConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishConfig")
            .field("address", &self.address)
            .field("wif", &self.wif.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `fi_03_multipart=debug`.
    pub level: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.dispatch_capacity, 1_024);
        assert_eq!(config.ancestry.ancestor_limit, 25);
        assert_eq!(config.splitter.data_limit, 1040);
        assert!(!config.publish.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NodeConfig::from_toml_str(
            r#"
            [rpc]
            url = "http://node:7313"

            [storage]
            backend = "rocksdb"

            [reassembler]
            retention_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.rpc.url, "http://node:7313");
        assert_eq!(config.rpc.timeout_ms, 30_000);
        assert_eq!(config.storage.backend, StorageBackend::Rocksdb);
        assert_eq!(config.reassembler.retention_secs, 60);
        assert_eq!(config.reassembler.max_groups_per_cycle, 10_000);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = NodeConfig::from_toml_str("[storage]\nbackend = \"mongo\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FI_RPC_URL", "http://other:1"),
            ("FI_RPC_PASSWORD", "hunter2"),
            ("FI_DATA_DIR", "/var/lib/fi"),
            ("FI_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = NodeConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.rpc.url, "http://other:1");
        assert_eq!(config.rpc.password.as_deref(), Some("hunter2"));
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/fi"));
        assert_eq!(config.logging.level, "debug");
        assert!(!format!("{:?}", config.rpc).contains("hunter2"));
    }

    #[test]
    fn test_half_configured_publishing_rejected() {
        let mut config = NodeConfig::default();
        config.publish.address = Some("FAddress".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::IncompletePublishing)));
    }
}
