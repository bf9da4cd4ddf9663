//! Storage layer errors

use obol_domain::{AssetId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (asset, transaction, order, stake)
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Debit would take a holding below zero
    #[error("Insufficient balance: user {user_id} asset {asset_id} has {available}, requested {requested}")]
    InsufficientBalance {
        /// Affected user
        user_id: UserId,
        /// Affected asset
        asset_id: AssetId,
        /// Balance at validation time
        available: Decimal,
        /// Debit amount that was rejected
        requested: Decimal,
    },

    /// Entity exists but is in the wrong state for the operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the violated expectation
        message: String,
    },

    /// Duplicate entity (unique constraint violation)
    #[error("Duplicate entity: {entity_type} with id {id}")]
    Duplicate {
        /// Type of entity
        entity_type: String,
        /// Entity ID or key
        id: String,
    },

    /// Lost a serialization/lock race; the caller may retry
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Domain error passthrough
    #[error("Domain error: {0}")]
    Domain(#[from] obol_domain::DomainError),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a duplicate error
    pub fn duplicate(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity_type: "unknown".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // Unique constraint violation
                Some("23505") => StoreError::Duplicate {
                    entity_type: "unknown".to_string(),
                    id: "unknown".to_string(),
                },
                // Serialization failure / deadlock detected
                Some("40001") | Some("40P01") => StoreError::Conflict(db_err.to_string()),
                _ => StoreError::Database(db_err.to_string()),
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}
