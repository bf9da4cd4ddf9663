//! Stub implementations for testing.
//!
//! These implementations simulate price feed behavior without reaching
//! any real source.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

use obol_domain::AssetId;

use crate::error::ExecError;
use crate::ports::{PriceOracle, RateQuote};

// =============================================================================
// Stub Oracle
// =============================================================================

/// Stub price oracle for testing.
///
/// Answers with programmed rates, or fails on demand.
pub struct StubOracle {
    /// Programmed rates by (base, quote)
    rates: RwLock<HashMap<(AssetId, AssetId), Decimal>>,
    /// Whether to fail every request
    failing: RwLock<bool>,
    /// Whether to fail only the next request
    fail_next: RwLock<bool>,
}

impl StubOracle {
    /// Create a new stub oracle with no rates programmed.
    pub fn new() -> Self {
        Self {
            rates: RwLock::new(HashMap::new()),
            failing: RwLock::new(false),
            fail_next: RwLock::new(false),
        }
    }

    /// Program a rate for a specific pair.
    pub fn set_rate(&self, base: AssetId, quote: AssetId, rate: Decimal) {
        let mut rates = self.rates.write().unwrap();
        rates.insert((base, quote), rate);
    }

    /// Configure every request to fail (until turned off).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.write().unwrap() = failing;
    }

    /// Configure only the next request to fail.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap() = fail;
    }

    /// Check if we should fail the current request.
    fn should_fail(&self) -> bool {
        if *self.failing.read().unwrap() {
            return true;
        }
        let mut fail_next = self.fail_next.write().unwrap();
        let fail = *fail_next;
        *fail_next = false; // Reset after check
        fail
    }
}

impl Default for StubOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for StubOracle {
    async fn rate(&self, base: AssetId, quote: AssetId) -> Result<RateQuote, ExecError> {
        if self.should_fail() {
            return Err(ExecError::RateUnavailable { base, quote });
        }

        let rates = self.rates.read().unwrap();
        let rate = rates
            .get(&(base, quote))
            .copied()
            .ok_or(ExecError::RateUnavailable { base, quote })?;

        Ok(RateQuote {
            rate,
            source: "stub".to_string(),
            as_of: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_stub_returns_programmed_rate() {
        let oracle = StubOracle::new();
        let base = Uuid::now_v7();
        let quote = Uuid::now_v7();

        oracle.set_rate(base, quote, dec!(42000));

        let quote_row = oracle.rate(base, quote).await.unwrap();
        assert_eq!(quote_row.rate, dec!(42000));
        assert_eq!(quote_row.source, "stub");

        // Unprogrammed pair fails
        assert!(oracle.rate(quote, base).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_next_resets_after_one_request() {
        let oracle = StubOracle::new();
        let base = Uuid::now_v7();
        let quote = Uuid::now_v7();
        oracle.set_rate(base, quote, dec!(1));

        oracle.set_fail_next(true);
        assert!(oracle.rate(base, quote).await.is_err());
        assert!(oracle.rate(base, quote).await.is_ok());
    }
}
