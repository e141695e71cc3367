//! Server Configuration
//!
//! Loaded from a TOML file; every field has a default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::quest::error::ConfigError;
use crate::quest::reward::RewardSettings;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Root of the data tree; quest files live under `<data_dir>/quests`
    pub data_dir: PathBuf,
    pub database_url: String,
    pub max_connections: u32,
    /// Watch quest files and reload the catalog on change
    pub hot_reload: bool,
    pub tick_interval_ms: u64,
    pub save_interval_secs: u64,
    pub rewards: RewardSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_url: "sqlite:quests.db?mode=rwc".to_string(),
            max_connections: 5,
            hot_reload: cfg!(debug_assertions),
            tick_interval_ms: 1000,
            save_interval_secs: 30,
            rewards: RewardSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Path from `QUEST_CONFIG`, falling back to `config.toml`
    pub fn path_from_env() -> PathBuf {
        std::env::var_os("QUEST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}
