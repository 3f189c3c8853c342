//! Service configuration, read from the environment (and `.env` when present).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::checkout::DEFAULT_COMMIT_TIMEOUT;
use crate::domain::value_objects::DEFAULT_CURRENCY;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub catalog_seed: Option<PathBuf>,
    pub cart_storage_dir: Option<PathBuf>,
    pub currency: String,
    pub checkout_timeout: Duration,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    Invalid { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8083,
            database_url: None,
            database_max_connections: 10,
            catalog_seed: None,
            cart_storage_dir: None,
            currency: DEFAULT_CURRENCY.to_string(),
            checkout_timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }
}

impl Config {
    /// Loads `.env` if there is one, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            port: parse(&var, "PORT")?.unwrap_or(defaults.port),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse(&var, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(defaults.database_max_connections),
            catalog_seed: var("CATALOG_SEED").map(PathBuf::from),
            cart_storage_dir: var("CART_STORAGE_DIR").map(PathBuf::from),
            currency: var("STORE_CURRENCY").unwrap_or(defaults.currency),
            checkout_timeout: parse(&var, "CHECKOUT_TIMEOUT_SECS")?.map(Duration::from_secs).unwrap_or(defaults.checkout_timeout),
        })
    }

    pub fn socket_addr(&self) -> String { format!("0.0.0.0:{}", self.port) }
}

fn parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError> {
    var(key)
        .map(|value| value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }))
        .transpose()
}
