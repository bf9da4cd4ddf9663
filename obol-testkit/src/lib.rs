//! Test helpers for Obol store-backed tests.
//!
//! Provides asset seeding, user funding, and conservation assertions.

mod helpers;

pub use helpers::{
    assert_conservation, fund_user, seed_default_assets, seeded_store, SeededAssets,
};
