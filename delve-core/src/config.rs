//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/delve/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/delve/` (~/.config/delve/)
//! - State/Logs: `$XDG_STATE_HOME/delve/` (~/.local/state/delve/)
//!
//! The backend URL can also be set with the `DELVE_API_URL` environment
//! variable, which wins over the config file.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `backend.base_url`
pub const API_URL_ENV: &str = "DELVE_API_URL";

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
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Research backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Search-mode retry policy
    #[serde(default)]
    pub search: SearchConfig,

    /// Research-mode polling policy
    #[serde(default)]
    pub research: ResearchConfig,

    /// Proxy server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Research backend connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Backend base URL (e.g., `http://localhost:8000`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,

    /// Endpoint paths relative to `base_url`
    #[serde(default)]
    pub endpoints: EndpointPaths,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_backend_timeout(),
            endpoints: EndpointPaths::default(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_backend_timeout() -> u64 {
    30
}

/// Backend endpoint paths
///
/// Paths taking an id (`research_status`, `research_result`, `thread`) get the
/// URL-encoded id appended as a final segment.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointPaths {
    pub query: String,
    pub research_start: String,
    pub research_status: String,
    pub research_result: String,
    pub thread: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            query: "/api/query".to_string(),
            research_start: "/api/research/query".to_string(),
            research_status: "/api/research/status".to_string(),
            research_result: "/api/research/result".to_string(),
            thread: "/api/thread".to_string(),
        }
    }
}

/// Search-mode retry policy
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Thread fetch attempts before giving up
    #[serde(default = "default_search_max_attempts")]
    pub max_attempts: u32,

    /// Delay between thread fetch attempts in milliseconds
    #[serde(default = "default_search_retry_interval")]
    pub retry_interval_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_search_max_attempts(),
            retry_interval_ms: default_search_retry_interval(),
        }
    }
}

impl SearchConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn default_search_max_attempts() -> u32 {
    20
}

fn default_search_retry_interval() -> u64 {
    1000
}

/// Research-mode polling policy
#[derive(Debug, Deserialize, Clone)]
pub struct ResearchConfig {
    /// Interval between job status polls in milliseconds
    #[serde(default = "default_research_poll_interval")]
    pub poll_interval_ms: u64,

    /// Iteration budget sent when starting a job
    #[serde(default = "default_research_iteration_limit")]
    pub iteration_limit: u32,

    /// Give up polling after this many seconds (0 = poll until terminal)
    #[serde(default = "default_research_max_poll")]
    pub max_poll_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_research_poll_interval(),
            iteration_limit: default_research_iteration_limit(),
            max_poll_secs: default_research_max_poll(),
        }
    }
}

impl ResearchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Polling deadline, `None` when polling is unbounded
    pub fn max_poll(&self) -> Option<Duration> {
        (self.max_poll_secs > 0).then(|| Duration::from_secs(self.max_poll_secs))
    }
}

fn default_research_poll_interval() -> u64 {
    2000
}

fn default_research_iteration_limit() -> u32 {
    3
}

fn default_research_max_poll() -> u64 {
    900
}

/// Proxy server settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Socket address the proxy binds to
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
        }
    }
}

fn default_server_bind() -> String {
    "127.0.0.1:3000".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, then apply env overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::debug!(base_url = %url, "Backend URL overridden from environment");
                config.backend.base_url = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(Error::Config("backend.base_url must not be empty".to_string()));
        }
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "backend.base_url must be an http(s) URL, got {}",
                self.backend.base_url
            )));
        }
        if self.search.max_attempts == 0 {
            return Err(Error::Config(
                "search.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.research.poll_interval_ms == 0 {
            return Err(Error::Config(
                "research.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.research.iteration_limit == 0 {
            return Err(Error::Config(
                "research.iteration_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/delve/config.toml` (~/.config/delve/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("delve").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/delve/` (~/.local/state/delve/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("delve")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/delve/delve.log` (~/.local/state/delve/delve.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("delve.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.search.max_attempts, 20);
        assert_eq!(config.search.retry_interval(), Duration::from_secs(1));
        assert_eq!(config.research.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.research.iteration_limit, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[backend]
base_url = "https://research.example.com"
timeout_secs = 10

[backend.endpoints]
thread = "/v2/thread"

[search]
max_attempts = 5
retry_interval_ms = 250

[research]
iteration_limit = 5
max_poll_secs = 0

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.backend.base_url, "https://research.example.com");
        assert_eq!(config.backend.timeout(), Duration::from_secs(10));
        assert_eq!(config.backend.endpoints.thread, "/v2/thread");
        assert_eq!(config.backend.endpoints.query, "/api/query");
        assert_eq!(config.search.max_attempts, 5);
        assert_eq!(config.search.retry_interval_ms, 250);
        assert_eq!(config.research.iteration_limit, 5);
        assert_eq!(config.research.poll_interval_ms, 2000);
        assert!(config.research.max_poll().is_none());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.search.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.backend.base_url = "localhost:8000".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.research.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[research]\npoll_interval_ms = 500\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.research.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.search.max_attempts, 20);
    }

    #[test]
    fn test_load_from_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search\nmax_attempts = 1").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
