//! Configuration management for the kubebridge gateway.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/kubebridge/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::exec::DEFAULT_SHELL;
use crate::session::{BridgeOptions, MAX_TIMEOUT_SECS};

/// Default address the HTTP API listens on.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:14122";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("listen_addr must be a socket address like 127.0.0.1:14122, got {0}")]
    InvalidListenAddr(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("{field} must be between 1 and 604800 seconds, got {value}")]
    InvalidTimeout { field: &'static str, value: u64 },

    #[error("default_shell must not be empty")]
    EmptyDefaultShell,

    #[error("cluster name must not be empty")]
    EmptyClusterName,

    #[error("duplicate cluster name: {0}")]
    DuplicateCluster(String),

    #[error("cluster {name}: server must be an http:// or https:// URL, got {server}")]
    InvalidClusterServer { name: String, server: String },
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server and logging configuration.
    pub server: ServerConfig,

    /// Session lifecycle configuration.
    pub session: SessionConfig,

    /// Clusters reachable through the gateway.
    pub clusters: Vec<ClusterConfig>,
}

/// HTTP server and logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub listen_addr: String,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily-rolling log files. Logs go to stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for exec setup and forwarded requests when the caller gives none.
    pub exec_timeout_secs: u64,

    /// Client budget for log streams.
    pub log_timeout_secs: u64,

    /// How long a finished exec session stays queryable.
    pub completed_retention_secs: u64,

    /// How often expired sessions are swept.
    pub cleanup_interval_secs: u64,

    /// Shell started when an exec request names no command.
    pub default_shell: String,
}

/// A cluster API server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterConfig {
    /// Name callers use in the `cluster` request field.
    pub name: String,

    /// API server base URL.
    pub server: String,

    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Accept any TLS certificate from the API server.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exec_timeout_secs: 30,
            log_timeout_secs: 6 * 60 * 60, // 6 hours
            completed_retention_secs: 60,
            cleanup_interval_secs: 30,
            default_shell: DEFAULT_SHELL.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn log_timeout(&self) -> Duration {
        Duration::from_secs(self.log_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Bridge options derived from this configuration.
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            exec_timeout: self.exec_timeout(),
            log_timeout: self.log_timeout(),
            completed_retention: Duration::from_secs(self.completed_retention_secs),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kubebridge")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - KUBEBRIDGE_LISTEN_ADDR: Override the HTTP listen address
    /// - KUBEBRIDGE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("KUBEBRIDGE_LISTEN_ADDR") {
            if !addr.is_empty() {
                tracing::info!("Overriding listen_addr from environment: {}", addr);
                self.server.listen_addr = addr;
            }
        }

        if let Ok(level) = std::env::var("KUBEBRIDGE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.server.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(
                self.server.listen_addr.clone(),
            ));
        }

        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        for (field, value) in [
            ("exec_timeout_secs", self.session.exec_timeout_secs),
            ("log_timeout_secs", self.session.log_timeout_secs),
            ("completed_retention_secs", self.session.completed_retention_secs),
            ("cleanup_interval_secs", self.session.cleanup_interval_secs),
        ] {
            if value == 0 || value > MAX_TIMEOUT_SECS {
                return Err(ConfigError::InvalidTimeout { field, value });
            }
        }

        if self.session.default_shell.trim().is_empty() {
            return Err(ConfigError::EmptyDefaultShell);
        }

        let mut names = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.trim().is_empty() {
                return Err(ConfigError::EmptyClusterName);
            }
            if !names.insert(cluster.name.as_str()) {
                return Err(ConfigError::DuplicateCluster(cluster.name.clone()));
            }
            let valid_server = url::Url::parse(&cluster.server)
                .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
                .unwrap_or(false);
            if !valid_server {
                return Err(ConfigError::InvalidClusterServer {
                    name: cluster.name.clone(),
                    server: cluster.server.clone(),
                });
            }
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn cluster(name: &str, server: &str) -> ClusterConfig {
        ClusterConfig {
            name: name.to_string(),
            server: server.to_string(),
            token: None,
            insecure_skip_tls_verify: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.server.log_level, "info");
        assert!(config.server.log_dir.is_none());
        assert_eq!(config.session.exec_timeout_secs, 30);
        assert_eq!(config.session.log_timeout_secs, 21600);
        assert_eq!(config.session.default_shell, "sh");
        assert!(config.clusters.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bridge_options_from_session_config() {
        let options = SessionConfig::default().bridge_options();
        assert_eq!(options.exec_timeout, Duration::from_secs(30));
        assert_eq!(options.log_timeout, Duration::from_secs(6 * 60 * 60));
        assert_eq!(options.completed_retention, Duration::from_secs(60));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[server]
listen_addr = "0.0.0.0:8080"
log_level = "debug"
log_dir = "/var/log/kubebridge"

[session]
exec_timeout_secs = 45
log_timeout_secs = 3600
completed_retention_secs = 10
cleanup_interval_secs = 5
default_shell = "bash"

[[clusters]]
name = "prod"
server = "https://10.0.0.1:6443"
token = "secret"

[[clusters]]
name = "kind"
server = "https://127.0.0.1:35000"
insecure_skip_tls_verify = true
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.server.log_dir, Some(PathBuf::from("/var/log/kubebridge")));
        assert_eq!(config.session.exec_timeout(), Duration::from_secs(45));
        assert_eq!(config.session.default_shell, "bash");
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.clusters[0].name, "prod");
        assert_eq!(config.clusters[0].token.as_deref(), Some("secret"));
        assert!(!config.clusters[0].insecure_skip_tls_verify);
        assert!(config.clusters[1].insecure_skip_tls_verify);
        assert!(config.clusters[1].token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[server\nlog_level = \"debug\"");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[session]
exec_timeout_secs = "soon"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_with_clusters() {
        let mut original = Config::default();
        original.server.log_level = "warn".to_string();
        original.clusters.push(ClusterConfig {
            token: Some("t".to_string()),
            ..cluster("prod", "https://10.0.0.1:6443")
        });

        let loaded = Config::from_toml(&original.to_toml().unwrap()).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_validate_listen_addr() {
        let mut config = Config::default();
        config.server.listen_addr = "localhost".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidListenAddr("localhost".to_string()))
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.server.log_level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );

        config.server.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeouts() {
        let mut config = Config::default();
        config.session.exec_timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTimeout {
                field: "exec_timeout_secs",
                value: 0
            })
        );

        let mut config = Config::default();
        config.session.log_timeout_secs = MAX_TIMEOUT_SECS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout {
                field: "log_timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_default_shell() {
        let mut config = Config::default();
        config.session.default_shell = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyDefaultShell));
    }

    #[test]
    fn test_validate_clusters() {
        let mut config = Config::default();
        config.clusters = vec![
            cluster("a", "https://a.example:6443"),
            cluster("a", "https://b.example:6443"),
        ];
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateCluster("a".to_string()))
        );

        config.clusters = vec![cluster("", "https://a.example:6443")];
        assert_eq!(config.validate(), Err(ConfigError::EmptyClusterName));

        config.clusters = vec![cluster("a", "ftp://a.example")];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidClusterServer { .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.session.default_shell = "zsh".to_string();
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("KUBEBRIDGE_LISTEN_ADDR", "0.0.0.0:9000");
        std::env::set_var("KUBEBRIDGE_LOG_LEVEL", "trace");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("KUBEBRIDGE_LISTEN_ADDR");
        std::env::remove_var("KUBEBRIDGE_LOG_LEVEL");

        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.server.log_level, "trace");
    }

    #[test]
    #[serial]
    fn test_env_overrides_ignore_empty() {
        std::env::set_var("KUBEBRIDGE_LOG_LEVEL", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("KUBEBRIDGE_LOG_LEVEL");

        assert_eq!(config.server.log_level, "info");
    }
}
