//! Application configuration.
//!
//! Stored as JSON at `~/.config/boardguard/config.json`. Missing fields fall
//! back to defaults; `BOARDGUARD_API_URL` and `BOARDGUARD_USERNAME` override
//! the file after it is read.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::auth::session::DEFAULT_RENEWAL_TIMEOUT_SECS;
use crate::guard::DEFAULT_LANDING_PATH;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "boardguard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/itb-kk";

pub const ENV_API_URL: &str = "BOARDGUARD_API_URL";
pub const ENV_USERNAME: &str = "BOARDGUARD_USERNAME";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub renewal_timeout_secs: u64,
    pub landing_path: String,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            renewal_timeout_secs: DEFAULT_RENEWAL_TIMEOUT_SECS,
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
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
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from `lookup`; blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = non_blank(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(username) = non_blank(ENV_USERNAME) {
            self.last_username = Some(username);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout_secs.max(1))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
