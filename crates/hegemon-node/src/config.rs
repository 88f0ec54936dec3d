//! Node configuration.
//!
//! Loaded from TOML, then overridden from the environment, then validated.
//! Every field has a default so a config file only needs what differs.

use crate::error::{NodeError, Result};
use hegemon_sync::{BackoffConfig, SyncConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides [`NodeConfig::data_dir`].
pub const ENV_DATA_DIR: &str = "HEGEMON_DATA_DIR";
/// Overrides [`NodeConfig::log_level`].
pub const ENV_LOG: &str = "HEGEMON_LOG";
/// Comma-separated list overriding [`NodeConfig::bootstrap_peers`].
pub const ENV_BOOTSTRAP_PEERS: &str = "HEGEMON_BOOTSTRAP_PEERS";

/// Everything a node needs to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Settlement name announced to peers
    pub player_name: String,
    /// Directory holding the wallet and the database
    pub data_dir: PathBuf,
    /// Wallet file, relative to `data_dir` unless absolute
    pub wallet_file: PathBuf,
    /// Database file, relative to `data_dir` unless absolute
    pub database_file: PathBuf,
    /// Seed recorded in the genesis command of a new chain
    pub genesis_seed: String,
    /// Transport peer ids to contact at startup
    pub bootstrap_peers: Vec<String>,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Replaces hostname and user as wallet key material when set
    pub wallet_identity: Option<String>,
    /// Chain reconciliation timing
    pub sync: SyncSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            player_name: "settler".to_string(),
            data_dir: PathBuf::from(".hegemon"),
            wallet_file: PathBuf::from("wallet.json"),
            database_file: PathBuf::from("hegemon.redb"),
            genesis_seed: "hegemon".to_string(),
            bootstrap_peers: Vec::new(),
            log_level: "info".to_string(),
            wallet_identity: None,
            sync: SyncSettings::default(),
        }
    }
}

/// Chain reconciliation timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// How long a chain request may go unanswered
    pub request_timeout_ms: u64,
    /// Attempts per chain request before giving up
    pub max_request_attempts: u32,
    /// First retry delay after a peer fails
    pub backoff_base_ms: u64,
    /// Ceiling on the retry delay
    pub backoff_max_ms: u64,
    /// How often the node re-announces itself and checks request deadlines
    pub announce_interval_ms: u64,
    /// Page size when serving chain requests
    pub max_blocks_per_response: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let defaults = SyncConfig::default();
        Self {
            request_timeout_ms: defaults.request_timeout_ms,
            max_request_attempts: defaults.max_request_attempts,
            backoff_base_ms: defaults.backoff.base_delay_ms,
            backoff_max_ms: defaults.backoff.max_delay_ms,
            announce_interval_ms: 10_000,
            max_blocks_per_response: defaults.max_blocks_per_response,
        }
    }
}

impl SyncSettings {
    /// The protocol-level view of these settings.
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            request_timeout_ms: self.request_timeout_ms,
            max_request_attempts: self.max_request_attempts,
            max_blocks_per_response: self.max_blocks_per_response,
            backoff: BackoffConfig {
                base_delay_ms: self.backoff_base_ms,
                max_delay_ms: self.backoff_max_ms,
                ..BackoffConfig::default()
            },
        }
    }
}

impl NodeConfig {
    /// Read a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.merge_with_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without overrides or validation.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse TOML text. Missing fields take their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `HEGEMON_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) {
        self.merge_with_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn merge_with_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
        if let Some(peers) = lookup(ENV_BOOTSTRAP_PEERS) {
            self.bootstrap_peers = peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.player_name.trim().is_empty() {
            return Err(NodeError::Config("player_name must not be empty".into()));
        }
        if self.genesis_seed.is_empty() {
            return Err(NodeError::Config("genesis_seed must not be empty".into()));
        }
        let sync = &self.sync;
        if sync.request_timeout_ms == 0 || sync.announce_interval_ms == 0 {
            return Err(NodeError::Config("sync timeouts must be non-zero".into()));
        }
        if sync.max_request_attempts == 0 || sync.max_blocks_per_response == 0 {
            return Err(NodeError::Config(
                "sync attempt and page limits must be non-zero".into(),
            ));
        }
        if sync.backoff_base_ms > sync.backoff_max_ms {
            return Err(NodeError::Config(format!(
                "backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                sync.backoff_base_ms, sync.backoff_max_ms
            )));
        }
        Ok(())
    }

    /// Resolved wallet file location.
    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join(&self.wallet_file)
    }

    /// Resolved database file location.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = NodeConfig::from_toml(
            r#"
            player_name = "Lagash"
            bootstrap_peers = ["peer-a"]

            [sync]
            request_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.player_name, "Lagash");
        assert_eq!(config.bootstrap_peers, vec!["peer-a".to_string()]);
        assert_eq!(config.sync.request_timeout_ms, 250);
        assert_eq!(config.sync.max_request_attempts, SyncSettings::default().max_request_attempts);
        assert_eq!(config.wallet_path(), PathBuf::from(".hegemon/wallet.json"));
        config.validate().unwrap();
    }

    #[test]
    fn environment_overrides_file_values() {
        let vars = HashMap::from([
            (ENV_DATA_DIR, "/var/lib/hegemon"),
            (ENV_LOG, "debug"),
            (ENV_BOOTSTRAP_PEERS, " a, b ,,c "),
        ]);
        let mut config = NodeConfig::default();
        config.merge_with_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/hegemon"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.bootstrap_peers, vec!["a", "b", "c"]);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/hegemon/hegemon.redb"));
    }

    #[test]
    fn absolute_files_ignore_data_dir() {
        let config = NodeConfig {
            wallet_file: PathBuf::from("/keys/w.json"),
            ..NodeConfig::default()
        };
        assert_eq!(config.wallet_path(), PathBuf::from("/keys/w.json"));
    }

    #[test]
    fn invalid_settings_are_refused() {
        let mut config = NodeConfig {
            player_name: "  ".into(),
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        config.player_name = "Eridu".into();
        config.sync.backoff_base_ms = config.sync.backoff_max_ms + 1;
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        config.sync.backoff_base_ms = 0;
        config.sync.request_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
    }

    #[test]
    fn unknown_toml_is_a_parse_error() {
        assert!(matches!(
            NodeConfig::from_toml("player_name = 5"),
            Err(NodeError::ConfigParse(_))
        ));
    }
}
