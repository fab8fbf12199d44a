//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::router::DEFAULT_BASE_PATH;
use crate::storage::db::DEFAULT_MAX_CONNECTIONS;

use super::validation::{ConfigError, expand_env_vars, validate_base_path};

// =============================================================================
// Constants
// =============================================================================

/// Default SQLite connection URL.
pub const DEFAULT_DSN: &str = "sqlite:webprofiler.db?mode=rwc";

/// Default upper bound on a buffered response body (8 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

fn default_true() -> bool {
    true
}

fn default_dsn() -> String {
    DEFAULT_DSN.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Record store backend.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DatabaseDriver {
    /// File-backed (or `:memory:`) SQLite through sqlx.
    #[default]
    Sqlite,
    /// Process-local store, lost on restart.
    Memory,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Backend (default: sqlite).
    #[serde(default)]
    pub driver: DatabaseDriver,

    /// SQLite connection URL, `${VAR}` expanded on load.
    #[serde(default = "default_dsn")]
    pub dsn: String,

    /// Maximum pooled connections (default: 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            dsn: default_dsn(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

// =============================================================================
// Profiler Configuration
// =============================================================================

/// Profiler behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Profile requests at all (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Mount point of the profiler pages (default: "/_profiler").
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Insert the toolbar loader into HTML responses (default: true).
    #[serde(default = "default_true")]
    pub inject_toolbar: bool,

    /// Collector identifiers forced off regardless of their own rule.
    #[serde(default)]
    pub disabled_collectors: Vec<String>,

    /// Larger response bodies are passed through unprofiled (default: 8 MiB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Purge records older than this on startup (e.g. "7d").
    #[serde(default, with = "humantime_serde")]
    pub retention: Option<Duration>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_path: default_base_path(),
            inject_toolbar: true,
            disabled_collectors: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            retention: None,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Profiler configuration.
    #[serde(default)]
    pub profiler: ProfilerConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse, expand and validate YAML configuration text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.database.dsn = expand_env_vars(&config.database.dsn);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate server bind address
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        // Validate server port
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database max_connections must be positive".to_string(),
            ));
        }

        if self.database.driver == DatabaseDriver::Sqlite
            && !self.database.dsn.starts_with("sqlite:")
        {
            return Err(ConfigError::ValidationError(format!(
                "database dsn '{}' is not a sqlite: URL",
                self.database.dsn
            )));
        }

        validate_base_path(&self.profiler.base_path)
            .map_err(|e| ConfigError::ValidationError(format!("profiler base_path: {}", e)))?;

        if self.profiler.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "profiler max_body_bytes must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.dsn, DEFAULT_DSN);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert!(config.profiler.enabled);
        assert!(config.profiler.inject_toolbar);
        assert_eq!(config.profiler.base_path, "/_profiler");
        assert_eq!(config.profiler.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(config.profiler.retention.is_none());
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
server:
  bind: 127.0.0.1
  port: 3000
database:
  driver: memory
profiler:
  base_path: /debug
  inject_toolbar: false
  disabled_collectors: [environment]
  retention: 7d
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.driver, DatabaseDriver::Memory);
        assert_eq!(config.profiler.base_path, "/debug");
        assert!(!config.profiler.inject_toolbar);
        assert_eq!(config.profiler.disabled_collectors, ["environment"]);
        assert_eq!(
            config.profiler.retention,
            Some(Duration::from_secs(7 * 86_400))
        );
    }

    #[test]
    fn test_driver_parse() {
        assert_eq!("SQLite".parse::<DatabaseDriver>(), Ok(DatabaseDriver::Sqlite));
        assert_eq!("memory".parse::<DatabaseDriver>(), Ok(DatabaseDriver::Memory));
        assert_eq!(
            "duckdb".parse::<DatabaseDriver>(),
            Err(strum::ParseError::VariantNotFound)
        );
        assert_eq!(DatabaseDriver::Memory.to_string(), "memory");
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind = "not-an-ip".to_string();

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("invalid server bind address")
        );
    }

    #[test]
    fn test_config_validation_dsn_must_match_driver() {
        let mut config = AppConfig::default();
        config.database.dsn = "postgres://localhost/db".to_string();
        assert!(config.validate().is_err());

        config.database.driver = DatabaseDriver::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_profiler() {
        let mut config = AppConfig::default();
        config.profiler.base_path = "profiler".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.profiler.max_body_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_retention_is_parse_error() {
        let result = AppConfig::from_yaml("profiler:\n  retention: soon\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
