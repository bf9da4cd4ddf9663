//! Value Objects for the Obol Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Domain errors for value object validation and entity transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Rate must be positive
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// Fee rate must be in [0, 1)
    #[error("Invalid fee rate: {0}")]
    InvalidFeeRate(String),

    /// Symbol must be non-empty alphanumeric
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Asset pair validation error
    #[error("Invalid asset pair: {0}")]
    InvalidPair(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Order fill validation error
    #[error("Invalid fill: {0}")]
    InvalidFill(String),
}

// =============================================================================
// Amount
// =============================================================================

/// Amount represents a positive decimal quantity of an asset
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Create a new Amount with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidAmount("Amount must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price in the quote asset
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice("Price must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Rate
// =============================================================================

/// Rate represents a positive exchange rate between two assets
///
/// One unit of the base asset is worth `rate` units of the quote asset.
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(Decimal);

impl Rate {
    /// Create a new Rate with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRate` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidRate("Rate must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// FeeRate
// =============================================================================

/// FeeRate represents a proportional fee taken from the source leg of a swap
///
/// # Invariants
/// - Must be >= 0 and < 1 (a 100% fee would consume the whole amount)
///
/// # Example
///
/// ```
/// # use obol_domain::value_objects::FeeRate;
/// # use rust_decimal_macros::dec;
/// let fee = FeeRate::new(dec!(0.01)).unwrap();
/// assert_eq!(fee.apply_to(dec!(100)), dec!(1.00));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate(Decimal);

impl FeeRate {
    /// Create a new FeeRate with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidFeeRate` if value < 0 or >= 1
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value < Decimal::ZERO {
            return Err(DomainError::InvalidFeeRate("Fee rate cannot be negative".to_string()));
        }
        if value >= Decimal::ONE {
            return Err(DomainError::InvalidFeeRate("Fee rate must be below 100%".to_string()));
        }
        Ok(Self(value))
    }

    /// A zero fee rate
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Compute the fee taken from `amount`
    pub fn apply_to(&self, amount: Decimal) -> Decimal {
        amount * self.0
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// AssetPair
// =============================================================================

/// AssetPair identifies a tradable (base, quote) asset combination
///
/// # Invariants
/// - Base and quote must differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    base: Uuid,
    quote: Uuid,
}

impl AssetPair {
    /// Create an AssetPair from base and quote asset ids
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPair` if base == quote
    pub fn new(base: Uuid, quote: Uuid) -> Result<Self, DomainError> {
        if base == quote {
            return Err(DomainError::InvalidPair(
                "Base and quote asset must differ".to_string(),
            ));
        }
        Ok(Self { base, quote })
    }

    /// Get the base asset id
    pub fn base(&self) -> Uuid {
        self.base
    }

    /// Get the quote asset id
    pub fn quote(&self) -> Uuid {
        self.quote
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

// =============================================================================
// OrderSide
// =============================================================================

/// OrderSide represents the direction of an order in the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    /// Buy the base asset, pay with the quote asset
    Buy,
    /// Sell the base asset, receive the quote asset
    Sell,
}

impl OrderSide {
    /// String form used in persistence and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    /// The opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(0.00000001)).is_ok());
        assert!(Amount::new(dec!(100)).is_ok());
        assert!(Amount::new(dec!(0)).is_err());
        assert!(Amount::new(dec!(-1)).is_err());
    }

    #[test]
    fn test_price_validation() {
        assert!(Price::new(dec!(95000)).is_ok());
        assert!(Price::new(dec!(0)).is_err());
        assert!(Price::new(dec!(-0.5)).is_err());
    }

    #[test]
    fn test_rate_validation() {
        assert!(Rate::new(dec!(2.0)).is_ok());
        assert!(Rate::new(dec!(0)).is_err());
    }

    #[test]
    fn test_fee_rate_bounds() {
        assert!(FeeRate::new(dec!(0)).is_ok());
        assert!(FeeRate::new(dec!(0.01)).is_ok());
        assert!(FeeRate::new(dec!(0.999)).is_ok());
        assert!(FeeRate::new(dec!(1)).is_err());
        assert!(FeeRate::new(dec!(-0.01)).is_err());
    }

    #[test]
    fn test_fee_rate_apply() {
        let fee = FeeRate::new(dec!(0.01)).unwrap();
        assert_eq!(fee.apply_to(dec!(100)), dec!(1.00));
        assert_eq!(FeeRate::zero().apply_to(dec!(100)), dec!(0));
    }

    #[test]
    fn test_asset_pair_rejects_same_asset() {
        let id = Uuid::now_v7();
        assert!(AssetPair::new(id, id).is_err());

        let other = Uuid::now_v7();
        let pair = AssetPair::new(id, other).unwrap();
        assert_eq!(pair.base(), id);
        assert_eq!(pair.quote(), other);
    }

    #[test]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
        assert_eq!(OrderSide::Buy.as_str(), "buy");
    }
}
