//! Obol Order Book Layer
//!
//! Price-time priority matching over store-backed resting orders.
//!
//! # Components
//!
//! - **MatchEngine**: place, cancel, and match limit orders per pair
//! - **MatchReport**: fills and force-cancellations of one match pass
//!
//! Matching settles through the same ledger batches as every other
//! balance movement: a fill commits the two order decrements and the
//! four settlement postings as one atomic store operation.

#![warn(clippy::all)]

pub mod engine;
pub mod error;

pub use engine::{MatchEngine, MatchReport};
pub use error::{BookError, BookResult};
