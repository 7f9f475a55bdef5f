//! Configuration management for plugctl

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Console host, e.g. `https://cloud.example.com`
    pub base_url: String,
    /// Path prefix of the console API, prepended to every workspace route
    pub api_prefix: String,
    /// Marketplace API root
    pub marketplace_url: String,
    /// Bearer token sent with console requests
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            api_prefix: "/console/api".to_string(),
            marketplace_url: "https://marketplace.dify.ai/api/v1".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Console API root: base url joined with the api prefix
    pub fn console_root(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_end_matches('/')
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Task list re-poll interval while any task is still pending or running
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 5000 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a cached response counts as fresh
    pub stale_time_ms: u64,
    /// Retries for retryable failures, unless a query opts out
    pub retry: u32,
    /// First retry delay; doubles per attempt, capped at 30s
    pub retry_base_delay_ms: u64,
    /// Entries older than this are dropped from the cache
    pub gc_time_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: 0,
            retry: 3,
            retry_base_delay_ms: 1000,
            gc_time_ms: 300_000,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Invalid config {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Environment variables win over the config file
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("PLUGCTL_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Ok(token) = std::env::var("PLUGCTL_API_TOKEN") {
            self.api.token = Some(token);
        }
        if let Ok(url) = std::env::var("PLUGCTL_MARKETPLACE_URL") {
            self.api.marketplace_url = url;
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "plugctl") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.polling.interval(), Duration::from_millis(5000));
        assert_eq!(config.cache.retry, 3);
        assert_eq!(
            config.api.console_root(),
            "http://localhost:5001/console/api"
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
base_url = "https://cloud.example.com/"

[polling]
interval_ms = 250
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.polling.interval_ms, 250);
        assert_eq!(config.api.api_prefix, "/console/api");
        assert!(config.api.console_root().starts_with("https://cloud.example.com/console"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.cache.retry_base_delay_ms, 1000);
    }
}
