//! Execution layer error types.

use obol_domain::{AssetId, StakeId, TransactionId};
use thiserror::Error;

/// Errors that can occur during execution operations.
#[derive(Debug, Error)]
pub enum ExecError {
    /// No active asset registered under the given symbol
    #[error("Unknown asset: {symbol}")]
    AssetNotFound {
        /// Symbol as given by the caller
        symbol: String,
    },

    /// No rate could be obtained for the pair
    #[error("No exchange rate available for {base}/{quote}")]
    RateUnavailable {
        /// Base asset of the requested pair
        base: AssetId,
        /// Quote asset of the requested pair
        quote: AssetId,
    },

    /// Deposit transaction does not exist
    #[error("Deposit not found: {0}")]
    DepositNotFound(TransactionId),

    /// Staking position does not exist
    #[error("Staking position not found: {0}")]
    StakeNotFound(StakeId),

    /// Staking position is still within its lock period
    #[error("Staking position {stake_id} is locked until {locked_until}")]
    PositionLocked {
        /// The locked position
        stake_id: StakeId,
        /// When the lock expires
        locked_until: chrono::DateTime<chrono::Utc>,
    },

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] obol_store::StoreError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] obol_domain::DomainError),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
