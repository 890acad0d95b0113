//! Configuration system for licensegate.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `licensegate.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `LICENSEGATE_SERVER_HOST` - Server bind address
//! - `LICENSEGATE_SERVER_PORT` - Server port
//! - `LICENSEGATE_DATABASE_URL` - SQLite connection URL
//! - `LICENSEGATE_DATABASE_MAX_CONNECTIONS` - Pool size
//! - `LICENSEGATE_DATABASE_ACQUIRE_TIMEOUT_SECS` - Startup/lock acquisition timeout
//! - `LICENSEGATE_LICENSE_KEY_PREFIX` - License key prefix
//! - `LICENSEGATE_LICENSE_KEY_BYTES` - Random bytes per generated key
//! - `LICENSEGATE_LOGGING_ENABLED` - Enable logging
//! - `LICENSEGATE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `LICENSEGATE_ADMIN_SESSION_ID` - Session id allowed to use the operator console

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<LicensegateConfig> = OnceLock::new();

/// Name of the optional configuration file (without extension).
pub const CONFIG_FILE: &str = "licensegate";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LicensegateConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// License key configuration
    pub license: LicenseConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Operator console configuration
    pub operator: OperatorConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// License key generation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix for generated license keys (e.g., "LIC" -> "LIC-XXXX-XXXX-...")
    pub key_prefix: String,
    /// Number of random bytes encoded into each key
    pub key_bytes: u8,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "LIC".to_string(),
            key_bytes: 20,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Seconds to wait for a connection or the database file lock
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/licensegate.db".to_string(),
            max_connections: 4,
            acquire_timeout_secs: 2,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// Operator console configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// The only session id the operator console will serve
    pub admin_session_id: i64,
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl LicensegateConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `licensegate.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let builder = Config::builder()
            .set_default("server.host", "127.0.0.1")
            .map_err(config_err)?
            .set_default("server.port", 8080)
            .map_err(config_err)?
            .set_default("license.key_prefix", "LIC")
            .map_err(config_err)?
            .set_default("license.key_bytes", 20)
            .map_err(config_err)?
            .set_default("database.url", "sqlite://data/licensegate.db")
            .map_err(config_err)?
            .set_default("database.max_connections", 4)
            .map_err(config_err)?
            .set_default("database.acquire_timeout_secs", 2)
            .map_err(config_err)?
            .set_default("logging.enabled", true)
            .map_err(config_err)?
            .set_default("logging.level", "info")
            .map_err(config_err)?
            .set_default("operator.admin_session_id", 0)
            .map_err(config_err)?
            // Load from licensegate.toml (optional)
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("LICENSEGATE_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option(
                "server.port",
                env_parsed::<i64>("LICENSEGATE_SERVER_PORT"),
            )
            .map_err(config_err)?
            .set_override_option("database.url", env::var("LICENSEGATE_DATABASE_URL").ok())
            .map_err(config_err)?
            .set_override_option(
                "database.max_connections",
                env_parsed::<i64>("LICENSEGATE_DATABASE_MAX_CONNECTIONS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.acquire_timeout_secs",
                env_parsed::<i64>("LICENSEGATE_DATABASE_ACQUIRE_TIMEOUT_SECS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.key_prefix",
                env::var("LICENSEGATE_LICENSE_KEY_PREFIX").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.key_bytes",
                env_parsed::<i64>("LICENSEGATE_LICENSE_KEY_BYTES"),
            )
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("LICENSEGATE_LOGGING_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("LICENSEGATE_LOG_LEVEL").ok())
            .map_err(config_err)?
            .set_override_option(
                "operator.admin_session_id",
                env_parsed::<i64>("LICENSEGATE_ADMIN_SESSION_ID"),
            )
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if !self.database.url.starts_with("sqlite:") {
            return Err(LicenseError::ConfigError(format!(
                "database.url must be a sqlite: URL, got '{}'",
                self.database.url
            )));
        }
        if self.database.max_connections == 0 {
            return Err(LicenseError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.database.acquire_timeout_secs == 0 {
            return Err(LicenseError::ConfigError(
                "database.acquire_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let prefix = &self.license.key_prefix;
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(LicenseError::ConfigError(format!(
                "license.key_prefix must be non-empty uppercase alphanumeric, got '{prefix}'"
            )));
        }
        if !(10..=64).contains(&self.license.key_bytes) {
            return Err(LicenseError::ConfigError(format!(
                "license.key_bytes must be between 10 and 64, got {}",
                self.license.key_bytes
            )));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static LicensegateConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = LicensegateConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is valid.
    Ok(CONFIG.get_or_init(|| config))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> LicenseResult<&'static LicensegateConfig> {
    get_config()
}
