//! Application configuration management.
//!
//! Configuration is stored at `~/.config/gw2track/config.json`; every field is
//! optional in the file and falls back to its default. A few settings can be
//! overridden from the environment (see [`Config::apply_env`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::rate_limit::{DEFAULT_CAPACITY, DEFAULT_WINDOW};
use crate::api::transport::{DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::api::{Endpoint, DEFAULT_MAX_RETRIES};

/// Application name used for config/data directory paths
const APP_NAME: &str = "gw2track";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Database file name inside the data directory
const DATABASE_FILE: &str = "gw2track.db";

pub const ENV_PROXY_URL: &str = "GW2TRACK_PROXY_URL";
pub const ENV_API_BASE_URL: &str = "GW2TRACK_API_BASE_URL";
pub const ENV_DATABASE: &str = "GW2TRACK_DATABASE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// When set, requests go through this CORS bridge instead of the API directly.
    pub proxy_url: Option<String>,
    pub rate_limit_capacity: u32,
    pub rate_limit_window_secs: u64,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            proxy_url: None,
            rate_limit_capacity: DEFAULT_CAPACITY,
            rate_limit_window_secs: DEFAULT_WINDOW.as_secs(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            database_path: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config = Self::load_from(&Self::config_path()?)?;
        Ok(config.apply_env(|name| std::env::var(name).ok()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Configured database path, or `gw2track.db` in the data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        match self.database_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join(DATABASE_FILE)),
        }
    }

    /// Override fields from `lookup` (normally the process environment).
    /// Empty values are ignored.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|value: &String| !value.trim().is_empty());
        if let Some(proxy) = lookup(ENV_PROXY_URL) {
            self.proxy_url = Some(proxy);
        }
        if let Some(base) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = base;
        }
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(db));
        }
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        match self.proxy_url.as_deref().map(str::trim) {
            Some(proxy) if !proxy.is_empty() => Endpoint::Proxied {
                proxy_url: proxy.to_string(),
            },
            _ => Endpoint::Direct {
                base_url: self.api_base_url.clone(),
            },
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
