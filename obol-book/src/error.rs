//! Order book error types.

use obol_domain::AssetId;
use thiserror::Error;

/// Errors that can occur during order book operations.
#[derive(Debug, Error)]
pub enum BookError {
    /// Asset is missing from the registry or soft-deleted
    #[error("Asset {0} is not tradeable")]
    AssetNotTradeable(AssetId),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] obol_store::StoreError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] obol_domain::DomainError),

    /// Settlement construction error
    #[error("Execution error: {0}")]
    Exec(#[from] obol_exec::ExecError),
}

/// Result type for order book operations.
pub type BookResult<T> = Result<T, BookError>;
