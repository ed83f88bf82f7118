//! Engine configuration
//!
//! Values come from an optional `billing.toml` next to the process and from
//! `BILLING__`-prefixed environment variables (a `.env` file is honoured),
//! environment winning.

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::BillingError;

/// When the customer balance cache is refreshed after a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceRefresh {
    /// Follow-up transaction right after the triggering one commits
    #[default]
    AfterCommit,
    /// Inside the triggering transaction
    InTransaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for a single ledger transaction, lock wait included
    #[serde(default = "default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,
    #[serde(default)]
    pub balance_refresh: BalanceRefresh,
    /// `tracing` filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_transaction_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: default_transaction_timeout_ms(),
            balance_refresh: BalanceRefresh::default(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `billing.toml` and the environment
    pub fn load() -> Result<Self, BillingError> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .add_source(File::with_name("billing").required(false))
            .add_source(Environment::with_prefix("BILLING").separator("__"))
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BillingError> {
        if self.transaction_timeout_ms == 0 {
            return Err(BillingError::Configuration(
                "transaction_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }
}

impl From<::config::ConfigError> for BillingError {
    fn from(err: ::config::ConfigError) -> Self {
        BillingError::Configuration(err.to_string())
    }
}
