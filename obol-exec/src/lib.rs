//! Obol Execution Layer
//!
//! Account operations composed into atomic ledger batches.
//!
//! # Architecture
//!
//! ```text
//! Request → resolve assets → capture rate → build batch → Store (atomic)
//! ```
//!
//! # Components
//!
//! - **Ports**: Traits defining the price oracle interface
//! - **Executor**: Deposits, withdrawals, transfers, trades, swaps, staking
//! - **Stub**: Test implementations for development
//!
//! # Example
//!
//! ```rust,ignore
//! use obol_exec::{Executor, StubOracle};
//! use obol_domain::FeeRate;
//! use obol_store::MemoryStore;
//! use std::sync::Arc;
//!
//! // Create components
//! let store = Arc::new(MemoryStore::new());
//! let oracle = Arc::new(StubOracle::new());
//! let executor = Executor::new(store, oracle, FeeRate::zero());
//!
//! // Run an operation
//! let deposit = executor.submit_deposit(user, "BTC", dec!(1), None).await?;
//! executor.confirm_deposit(deposit.id).await?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use executor::{match_settlement, Executor, SwapOutcome, SwapPreview};
pub use ports::{FallbackOracle, PriceOracle, RateQuote, StoredRateOracle};
pub use stub::StubOracle;
