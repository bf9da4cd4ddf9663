//! Obol Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains entities, value objects, and domain rules for the ledger core.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    Asset, AssetId, AssetKind, Direction, ExchangeRate, Holding, Order, OrderId, OrderStatus,
    StakeId, StakingPosition, Transaction, TransactionId, TransactionStatus, TransactionType,
    UserId,
};
pub use value_objects::{Amount, AssetPair, DomainError, FeeRate, OrderSide, Price, Rate};
