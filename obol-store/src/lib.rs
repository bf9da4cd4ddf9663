//! Obol Storage Layer
//!
//! Provides persistence for holdings, the transaction log, orders, rates,
//! and staking positions.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Fast implementation for testing
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! Balance movements go through [`LedgerBatch`]: a set of postings the store
//! validates and applies atomically, so holdings and the append-only
//! transaction log never disagree.
//!
//! # Usage
//!
//! ```rust
//! use obol_store::{LedgerBatch, MemoryStore, Posting, Store};
//! use obol_domain::{Amount, TransactionType};
//! use rust_decimal_macros::dec;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let user = Uuid::now_v7();
//!     let asset = Uuid::now_v7();
//!
//!     let batch = LedgerBatch::new().with(Posting::new(
//!         user,
//!         asset,
//!         TransactionType::Deposit,
//!         Amount::new(dec!(100)).unwrap(),
//!     ));
//!     store.ledger().apply(&batch).await.unwrap();
//!
//!     assert_eq!(store.holdings().balance(user, asset).await.unwrap(), dec!(100));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod error;
pub mod memory;
pub mod query;
pub mod repository;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use batch::{LedgerBatch, Posting};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use query::{HistoryQuery, HistorySort};
pub use repository::{
    AssetRepository, HoldingRepository, LedgerRepository, MatchOutcome, OrderRepository,
    RateRepository, StakingRepository, Store, TransactionRepository,
};

#[cfg(feature = "postgres")]
pub use postgres::PgStore;
