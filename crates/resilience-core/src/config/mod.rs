//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! upstream endpoints, retry and concurrency limits, the scoring failure
//! policy and where the category table comes from.
//!
//! Configuration is stored at `<config_dir>/resilience-mapper/config.json`.
//! Cache and log locations are derived from the platform's per-user
//! directories and are not configurable.

pub mod categories;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::resilience::FailurePolicy;

pub use categories::{CategoryConfig, CategoryTable, TravelProfile};

/// Application name used for config/cache/log directory paths
pub const APP_NAME: &str = "resilience-mapper";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable that overrides the configured isochrone token
pub const TOKEN_ENV_VAR: &str = "MAPBOX_TOKEN";

/// Public Overpass interpreter endpoint.
const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Server-side Overpass timeout. Whole-study-area downloads can be large.
pub const DEFAULT_OVERPASS_TIMEOUT_SECS: u64 = 180;

const DEFAULT_ISOCHRONE_BASE_URL: &str = "https://api.mapbox.com";

/// Isochrone requests in flight per point.
const DEFAULT_ISOCHRONE_CONCURRENCY: usize = 8;

/// Linear simplification tolerance in degrees (~10 m at mid latitudes).
const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.0001;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub overpass_url: String,
    pub overpass_timeout_secs: u64,
    /// Attempts per category before the download gives up on it.
    pub max_attempts: u32,
    /// Pause between category downloads, skipped before the first.
    pub request_delay_secs: f64,
    pub isochrone_base_url: String,
    pub isochrone_concurrency: usize,
    pub simplify_tolerance: f64,
    pub failure_policy: FailurePolicy,
    /// Replaces the built-in category table when set.
    pub categories_file: Option<PathBuf>,
    pub mapbox_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            overpass_timeout_secs: DEFAULT_OVERPASS_TIMEOUT_SECS,
            max_attempts: 3,
            request_delay_secs: 0.0,
            isochrone_base_url: DEFAULT_ISOCHRONE_BASE_URL.to_string(),
            isochrone_concurrency: DEFAULT_ISOCHRONE_CONCURRENCY,
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
            failure_policy: FailurePolicy::default(),
            categories_file: None,
            mapbox_token: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Per-user cache root, e.g. `~/.cache/resilience-mapper` on Linux.
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn log_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find local data directory"))?;
        Ok(data_dir.join(APP_NAME).join("logs"))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs.max(0.0))
    }

    /// The category table in effect: the configured file, else the built-in set.
    pub fn categories(&self) -> Result<CategoryTable, ConfigError> {
        match self.categories_file {
            Some(ref path) => CategoryTable::from_file(path),
            None => Ok(CategoryTable::builtin()),
        }
    }

    /// Resolve the isochrone token, preferring the environment.
    pub fn resolve_token(&self) -> Result<String, ConfigError> {
        self.resolve_token_from(std::env::var(TOKEN_ENV_VAR).ok())
    }

    fn resolve_token_from(&self, env_value: Option<String>) -> Result<String, ConfigError> {
        env_value
            .into_iter()
            .chain(self.mapbox_token.clone())
            .map(|token| token.trim().to_string())
            .find(|token| !token.is_empty())
            .ok_or(ConfigError::MissingToken)
    }
}
