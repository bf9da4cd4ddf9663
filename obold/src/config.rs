//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use obol_domain::FeeRate;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string, if a database is configured
    pub database_url: Option<String>,

    /// Ledger configuration
    pub ledger: LedgerConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Swap fee rate, taken in the from-asset (0.01 = 1%)
    pub fee_rate: FeeRate,
    /// Interval between match passes, in milliseconds
    pub match_interval_ms: u64,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let ledger = Self::load_ledger_config()?;
        let database_url = env::var("DATABASE_URL").ok();

        Ok(Self {
            database_url,
            ledger,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            database_url: None,
            ledger: LedgerConfig {
                fee_rate: FeeRate::new(Decimal::new(1, 2)).expect("valid test fee"), // 1%
                match_interval_ms: 10,
            },
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("OBOL_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid OBOL_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_ledger_config() -> DaemonResult<LedgerConfig> {
        let fee_rate = Self::load_decimal_env(
            "OBOL_FEE_RATE",
            Decimal::new(1, 2), // 1%
        )?;
        let fee_rate = FeeRate::new(fee_rate)
            .map_err(|e| DaemonError::Config(format!("Invalid OBOL_FEE_RATE: {}", e)))?;

        let interval_str = env::var("OBOL_MATCH_INTERVAL_MS").unwrap_or_else(|_| "500".to_string());
        let match_interval_ms = interval_str
            .parse::<u64>()
            .map_err(|_| DaemonError::Config(format!("Invalid OBOL_MATCH_INTERVAL_MS: {}", interval_str)))?;

        Ok(LedgerConfig { fee_rate, match_interval_ms })
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            ledger: LedgerConfig {
                fee_rate: FeeRate::new(Decimal::new(1, 2)).expect("valid default fee"), // 1%
                match_interval_ms: 500,
            },
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
