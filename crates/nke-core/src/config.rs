//! Configuration system for the Neural Key Exchange server.
//!
//! Resolution order: environment variables -> config file -> defaults.
//!
//! Config file location:
//!   1. $NKE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/nke/config.toml
//!   3. ~/.config/nke/config.toml

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::frame::TpmConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NkeConfig {
    pub network: NetworkConfig,
    pub tpm_defaults: TpmConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP/WebSocket listen port.
    pub port: u16,
    /// Comma-separated CORS origins, or `*` for any.
    pub cors_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay between rounds, in milliseconds.
    pub inter_round_delay_ms: u64,
    /// Hard round cap — exceeding it raises a `SyncError`. Spec names
    /// 50,000 as a generous default ceiling.
    pub max_rounds: u64,
    /// How long the receive loop waits before sending a keepalive ping.
    pub idle_timeout_secs: u64,
    /// Whether to simulate a passive eavesdropper TPM alongside each sync.
    pub show_attacker: bool,
}

impl Default for NkeConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            tpm_defaults: TpmConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_origins: "*".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            inter_round_delay_ms: 20,
            max_rounds: 50_000,
            idle_timeout_secs: 30,
            show_attacker: true,
        }
    }
}

// -- Errors --------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// -- Loading ---------------------------------------------------------------

impl NkeConfig {
    /// Load config: env vars -> file -> defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            NkeConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("NKE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply `NKE_*` env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NKE_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Ok(v) = std::env::var("CORS_ORIGINS") {
            self.network.cors_origins = v;
        }
        if let Ok(v) = std::env::var("NKE_SYNC__INTER_ROUND_DELAY_MS") {
            if let Ok(p) = v.parse() {
                self.sync.inter_round_delay_ms = p;
            }
        }
        if let Ok(v) = std::env::var("NKE_SYNC__MAX_ROUNDS") {
            if let Ok(p) = v.parse() {
                self.sync.max_rounds = p;
            }
        }
        if let Ok(v) = std::env::var("NKE_SYNC__SHOW_ATTACKER") {
            self.sync.show_attacker = v == "true" || v == "1";
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("nke")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/tmp"))
}
