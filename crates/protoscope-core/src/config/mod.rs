//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::database::default_database_path;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "PROTOSCOPE_CONFIG_DIR";

/// Environment variable overriding the database path
pub const DATABASE_ENV: &str = "PROTOSCOPE_DATABASE";

/// Largest insert batch; keeps one statement well under SQLite's bound
/// parameter limit (16 columns per row)
pub const MAX_BATCH_SIZE: usize = 1000;

/// Protoscope configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Explicit database file; falls back to the platform data location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: i64,
    pub max_limit: i64,
    pub query_timeout_ms: u64,
    pub suggestion_default_limit: i64,
    pub suggestion_max_limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub batch_size: usize,
    pub lock_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 1000,
            query_timeout_ms: 30_000,
            suggestion_default_limit: 5,
            suggestion_max_limit: 20,
        }
    }
}

impl SearchConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            lock_timeout_ms: 30_000,
        }
    }
}

impl IndexingConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl DatabaseSettings {
    /// Resolve the database path: environment, then config file, then default
    pub fn resolved_path(&self) -> PathBuf {
        if let Ok(path) = env::var(DATABASE_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        match &self.path {
            Some(path) => PathBuf::from(path),
            None => default_database_path(),
        }
    }
}

const KEYS: [&str; 8] = [
    "database.path",
    "search.default_limit",
    "search.max_limit",
    "search.query_timeout_ms",
    "search.suggestion_default_limit",
    "search.suggestion_max_limit",
    "indexing.batch_size",
    "indexing.lock_timeout_ms",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("protoscope")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let search = &self.search;
        if search.default_limit <= 0 {
            return Err(anyhow!("search.default_limit must be positive"));
        }
        if search.max_limit < search.default_limit {
            return Err(anyhow!(
                "search.max_limit ({}) must be at least search.default_limit ({})",
                search.max_limit,
                search.default_limit
            ));
        }
        if search.query_timeout_ms == 0 {
            return Err(anyhow!("search.query_timeout_ms must be positive"));
        }
        if search.suggestion_default_limit <= 0 {
            return Err(anyhow!("search.suggestion_default_limit must be positive"));
        }
        if search.suggestion_max_limit < search.suggestion_default_limit {
            return Err(anyhow!(
                "search.suggestion_max_limit must be at least search.suggestion_default_limit"
            ));
        }
        if self.indexing.batch_size == 0 {
            return Err(anyhow!("indexing.batch_size must be positive"));
        }
        if self.indexing.batch_size > MAX_BATCH_SIZE {
            return Err(anyhow!(
                "indexing.batch_size ({}) must be at most {}",
                self.indexing.batch_size,
                MAX_BATCH_SIZE
            ));
        }
        if self.indexing.lock_timeout_ms == 0 {
            return Err(anyhow!("indexing.lock_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self.database.resolved_path().display().to_string()),

            "search.default_limit" => Ok(self.search.default_limit.to_string()),
            "search.max_limit" => Ok(self.search.max_limit.to_string()),
            "search.query_timeout_ms" => Ok(self.search.query_timeout_ms.to_string()),
            "search.suggestion_default_limit" => {
                Ok(self.search.suggestion_default_limit.to_string())
            }
            "search.suggestion_max_limit" => Ok(self.search.suggestion_max_limit.to_string()),

            "indexing.batch_size" => Ok(self.indexing.batch_size.to_string()),
            "indexing.lock_timeout_ms" => Ok(self.indexing.lock_timeout_ms.to_string()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `protoscope config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    ///
    /// The whole config is re-validated, so a value that conflicts with
    /// another setting is rejected and the config is left unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut updated = self.clone();
        match key {
            "database.path" => {
                let value = value.trim();
                updated.database.path = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "search.default_limit" => {
                updated.search.default_limit = parse_value(key, value)?;
            }
            "search.max_limit" => {
                updated.search.max_limit = parse_value(key, value)?;
            }
            "search.query_timeout_ms" => {
                updated.search.query_timeout_ms = parse_value(key, value)?;
            }
            "search.suggestion_default_limit" => {
                updated.search.suggestion_default_limit = parse_value(key, value)?;
            }
            "search.suggestion_max_limit" => {
                updated.search.suggestion_max_limit = parse_value(key, value)?;
            }
            "indexing.batch_size" => {
                updated.indexing.batch_size = parse_value(key, value)?;
            }
            "indexing.lock_timeout_ms" => {
                updated.indexing.lock_timeout_ms = parse_value(key, value)?;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `protoscope config list` to see available keys.",
                    key
                ));
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}
