use crate::utils::error::{Result, TtlPoolError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub workload: WorkloadSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Target address (host:port)
    #[serde(default = "default_address")]
    pub address: String,
    /// Number of connections kept open
    #[serde(default = "default_pool_size")]
    pub size: usize,
    /// Idle time after which a connection is replaced (seconds)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Timeout for establishing new connections (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSettings {
    #[serde(default = "default_main_message")]
    pub main_message: String,
    #[serde(default = "default_main_hold_ms")]
    pub main_hold_ms: u64,
    #[serde(default = "default_background_message")]
    pub background_message: String,
    #[serde(default = "default_background_hold_ms")]
    pub background_hold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

// Default values
fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_pool_size() -> usize {
    3
}

fn default_ttl_secs() -> u64 {
    3
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_main_message() -> String {
    "hello from main".to_string()
}

fn default_main_hold_ms() -> u64 {
    1000
}

fn default_background_message() -> String {
    "hello from background".to_string()
}

fn default_background_hold_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            size: default_pool_size(),
            ttl_secs: default_ttl_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            main_message: default_main_message(),
            main_hold_ms: default_main_hold_ms(),
            background_message: default_background_message(),
            background_hold_ms: default_background_hold_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| TtlPoolError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| TtlPoolError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.address.trim().is_empty() {
            return Err(TtlPoolError::Config(
                "pool.address cannot be empty".to_string(),
            ));
        }

        if self.pool.size == 0 {
            return Err(TtlPoolError::Config(
                "pool.size must be greater than 0".to_string(),
            ));
        }

        if self.pool.ttl_secs == 0 {
            return Err(TtlPoolError::Config(
                "pool.ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.pool.connect_timeout_ms == 0 {
            return Err(TtlPoolError::Config(
                "pool.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(TtlPoolError::Config(format!(
                "Invalid log format: {}. Must be 'pretty' or 'json'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = r#"[pool]
address = "localhost:8080"
size = 3               # Connections dialed at startup and kept open
ttl_secs = 3           # Idle connections older than this are redialed on next use
connect_timeout_ms = 5000

[workload]
main_message = "hello from main"
main_hold_ms = 1000
background_message = "hello from background"
background_hold_ms = 3000

[logging]
level = "info"    # Options: trace, debug, info, warn, error
format = "pretty" # Options: pretty, json
"#;

        std::fs::write(path.as_ref(), example).map_err(|e| {
            TtlPoolError::Config(format!("Failed to write example config: {}", e))
        })?;

        Ok(())
    }
}
