//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/auditlens/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/auditlens/` (~/.config/auditlens/)
//! - State/Logs: `$XDG_STATE_HOME/auditlens/` (~/.local/state/auditlens/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Upstream log source connection
    #[serde(default)]
    pub source: SourceConfig,

    /// Pagination bounds for a single bulk fetch
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Freshness and refresh policy for cached windows
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream log source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Base URL of the upstream API (e.g., `https://example.tld/api`)
    pub base_url: Option<String>,

    /// Bearer token for the upstream API
    pub api_token: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            timeout_secs: default_source_timeout(),
        }
    }
}

impl SourceConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_none() {
            return Err(Error::Config(
                "source.base_url is required".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "source.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_source_timeout() -> u64 {
    30
}

/// Bounds for a single bulk fetch across upstream pages.
///
/// The upstream caps responses at 100 entries per page, so `page_size` above
/// that only wastes the short-page termination signal.
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Entries requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Hard cap on total entries gathered in one fetch
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Safety ceiling on page requests per fetch
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Delay between successive page requests in milliseconds
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_entries: default_max_entries(),
            max_pages: default_max_pages(),
            page_delay_ms: default_page_delay_ms(),
        }
    }
}

impl FetchConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_max_entries() -> usize {
    5000
}

fn default_max_pages() -> u32 {
    100
}

fn default_page_delay_ms() -> u64 {
    50
}

/// Freshness and refresh policy for cached windows
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Age in seconds after which an entry is served stale while revalidating
    #[serde(default = "default_stale_secs")]
    pub stale_secs: u64,

    /// Seconds an entry may sit unreferenced before it is evicted
    #[serde(default = "default_gc_secs")]
    pub gc_secs: u64,

    /// Proactive refresh cadence in seconds while a subscriber is active
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Max retry attempts for a failed refresh
    #[serde(default = "default_cache_max_retries")]
    pub max_retries: usize,

    /// Base retry delay in milliseconds (doubles per attempt)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Retry delay ceiling in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_secs: default_stale_secs(),
            gc_secs: default_gc_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            max_retries: default_cache_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl CacheConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }

    pub fn gc_after(&self) -> Duration {
        Duration::from_secs(self.gc_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

fn default_stale_secs() -> u64 {
    20
}

fn default_gc_secs() -> u64 {
    15 * 60
}

fn default_refresh_interval_secs() -> u64 {
    2 * 60
}

fn default_cache_max_retries() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/auditlens/config.toml` (~/.config/auditlens/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("auditlens").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/auditlens/` (~/.local/state/auditlens/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("auditlens")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/auditlens/auditlens.log` (~/.local/state/auditlens/auditlens.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("auditlens.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.source.base_url.is_none());
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.fetch.max_entries, 5000);
        assert_eq!(config.fetch.max_pages, 100);
        assert_eq!(config.cache.stale_secs, 20);
        assert_eq!(config.cache.gc_secs, 900);
        assert_eq!(config.cache.refresh_interval_secs, 120);
        assert_eq!(config.cache.max_retries, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[source]
base_url = "https://example.tld/api"
api_token = "al_live_xxxx"
timeout_secs = 10

[fetch]
page_size = 50
max_entries = 2000

[cache]
stale_secs = 5
refresh_interval_secs = 30

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.source.base_url.as_deref(),
            Some("https://example.tld/api")
        );
        assert_eq!(config.source.timeout_secs, 10);
        assert_eq!(config.fetch.page_size, 50);
        assert_eq!(config.fetch.max_entries, 2000);
        // Unspecified knobs keep their defaults
        assert_eq!(config.fetch.max_pages, 100);
        assert_eq!(config.cache.stale_secs, 5);
        assert_eq!(config.cache.gc_secs, 900);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_source_validation() {
        // Missing base_url should fail
        let config = SourceConfig::default();
        assert!(config.validate().is_err());

        let config = SourceConfig {
            base_url: Some("https://example.tld/api".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = SourceConfig {
            base_url: Some("https://example.tld/api".to_string()),
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[source]\nbase_url = \"https://example.tld/api\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(
            config.source.base_url.as_deref(),
            Some("https://example.tld/api")
        );
    }
}
