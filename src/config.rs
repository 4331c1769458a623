use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::TableStatus;

/// Default location of the optional configuration file
pub const DEFAULT_CONFIG_FILE: &str = "config/bar-pos.toml";

const ENV_PREFIX: &str = "BAR_POS";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PosConfig {
    pub database: DatabaseConfig,
    pub billing: BillingConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`
    pub path: PathBuf,
    pub max_connections: usize,
    pub checkout_timeout_seconds: u64,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("data/bar_pos.db"),
            max_connections: 4,
            checkout_timeout_seconds: 30,
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        DatabaseConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 1,
            ..Default::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub vat_percent: Decimal,
    pub service_charge_percent: Decimal,
    pub currency_symbol: String,
    pub currency_decimals: u32,
    /// Status a table is put in once its order is completed or cancelled
    pub release_table_as: TableStatus,
}

impl Default for BillingConfig {
    fn default() -> Self {
        BillingConfig {
            vat_percent: Decimal::ZERO,
            service_charge_percent: Decimal::ZERO,
            currency_symbol: "₫".to_string(),
            currency_decimals: 0,
            release_table_as: TableStatus::Available,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
        }
    }
}

impl PosConfig {
    /// Load from `config/bar-pos.toml` (optional) and `BAR_POS__*` env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: PosConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if !matches!(
            self.billing.release_table_as,
            TableStatus::Available | TableStatus::Cleaning
        ) {
            return Err(ConfigError::Message(format!(
                "billing.release_table_as cannot be '{}'",
                self.billing.release_table_as
            )));
        }
        Ok(())
    }
}
