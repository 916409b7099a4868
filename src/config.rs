use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub trader: TraderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraderConfig {
    /// Maximum age in seconds for a queued intent to take part in a
    /// consolidation pass
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Interval between flush cycles in seconds
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Quote currency of the paper exchange account
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            flush_interval_secs: default_flush_interval_secs(),
            quote_currency: default_quote_currency(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    120
}

fn default_flush_interval_secs() -> u64 {
    60
}

fn default_quote_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("trader.ttl_secs", 120)?
            .set_default("trader.flush_interval_secs", 60)?
            .set_default("trader.quote_currency", "USD")?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TELLER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TELLER_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("TELLER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
