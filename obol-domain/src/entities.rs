//! Domain entities for the Obol ledger core
//!
//! Entities carry identity and lifecycle. State transitions are validated
//! here; persistence and atomicity are the storage layer's concern.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::value_objects::{Amount, AssetPair, DomainError, OrderSide, Price, Rate};

/// User identifier
pub type UserId = Uuid;
/// Asset identifier
pub type AssetId = Uuid;
/// Transaction identifier
pub type TransactionId = Uuid;
/// Order identifier
pub type OrderId = Uuid;
/// Staking position identifier
pub type StakeId = Uuid;

// =============================================================================
// Asset
// =============================================================================

/// Asset class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    /// Crypto asset (on-chain settlement out of scope)
    Crypto,
    /// Fiat currency
    Fiat,
}

impl AssetKind {
    /// String form used in persistence and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Crypto => "crypto",
            AssetKind::Fiat => "fiat",
        }
    }
}

/// Reference data for a tradable asset
///
/// Immutable once referenced by a transaction. Deactivation is a soft delete:
/// inactive assets are excluded from read paths by explicit filter, the row
/// itself is never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset id
    pub id: AssetId,
    /// Unique symbol, stored uppercase (lookups are case-insensitive)
    pub symbol: String,
    /// Display/storage precision in decimal places
    pub decimals: u32,
    /// Asset class
    pub kind: AssetKind,
    /// Soft-delete flag
    pub active: bool,
}

impl Asset {
    /// Create a new active asset
    ///
    /// The symbol is normalized to uppercase.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` if the symbol is empty or
    /// contains non-alphanumeric characters.
    pub fn new(symbol: &str, decimals: u32, kind: AssetKind) -> Result<Self, DomainError> {
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::InvalidSymbol(format!(
                "Symbol must be non-empty alphanumeric, got {:?}",
                symbol
            )));
        }

        Ok(Self {
            id: Uuid::now_v7(),
            symbol: symbol.to_ascii_uppercase(),
            decimals,
            kind,
            active: true,
        })
    }

    /// Case-insensitive symbol match
    pub fn matches_symbol(&self, symbol: &str) -> bool {
        self.symbol.eq_ignore_ascii_case(symbol)
    }

    /// Soft-delete the asset
    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

// =============================================================================
// Holding
// =============================================================================

/// A user's balance record for one asset
///
/// # Invariants
/// - Exactly one Holding per (user_id, asset_id)
/// - `available` >= 0 at all times (enforced by the ledger before commit)
/// - Never deleted, only zeroed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// Owning user
    pub user_id: UserId,
    /// Held asset
    pub asset_id: AssetId,
    /// Available balance
    pub available: Decimal,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Holding {
    /// Create a holding with an initial balance (first credit)
    pub fn new(user_id: UserId, asset_id: AssetId, available: Decimal) -> Self {
        Self {
            user_id,
            asset_id,
            available,
            updated_at: Utc::now(),
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Direction of a balance movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Balance increases
    Credit,
    /// Balance decreases
    Debit,
}

impl Direction {
    /// Sign applied to the amount for reconciliation (+1 credit, -1 debit)
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Credit => Decimal::ONE,
            Direction::Debit => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Type of a balance-affecting event
///
/// Each type implies a direction, so the signed sum of SUCCESS transactions
/// for a (user, asset) reconciles against the holding balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Deposit claim / confirmed deposit
    Deposit,
    /// Withdrawal to an external destination
    Withdraw,
    /// Asset received through a trade
    TradeBuy,
    /// Asset spent through a trade
    TradeSell,
    /// Funds moved into a staking position
    Stake,
    /// Funds returned from a staking position
    Unstake,
    /// Internal transfer, receiving side
    TransferIn,
    /// Internal transfer, sending side
    TransferOut,
    /// Fee charged on a swap
    Fee,
}

impl TransactionType {
    /// String form used in persistence and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
            TransactionType::TradeBuy => "trade_buy",
            TransactionType::TradeSell => "trade_sell",
            TransactionType::Stake => "stake",
            TransactionType::Unstake => "unstake",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::Fee => "fee",
        }
    }

    /// Parse the persisted string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TransactionType::Deposit),
            "withdraw" => Some(TransactionType::Withdraw),
            "trade_buy" => Some(TransactionType::TradeBuy),
            "trade_sell" => Some(TransactionType::TradeSell),
            "stake" => Some(TransactionType::Stake),
            "unstake" => Some(TransactionType::Unstake),
            "transfer_in" => Some(TransactionType::TransferIn),
            "transfer_out" => Some(TransactionType::TransferOut),
            "fee" => Some(TransactionType::Fee),
            _ => None,
        }
    }

    /// Direction this type moves the holding balance
    pub fn direction(&self) -> Direction {
        match self {
            TransactionType::Deposit
            | TransactionType::TradeBuy
            | TransactionType::Unstake
            | TransactionType::TransferIn => Direction::Credit,
            TransactionType::Withdraw
            | TransactionType::TradeSell
            | TransactionType::Stake
            | TransactionType::TransferOut
            | TransactionType::Fee => Direction::Debit,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a transaction
///
/// Only deposits are ever PENDING; every other ledger write is committed as
/// SUCCESS together with the balance mutation it records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Recorded but not yet affecting any holding
    Pending,
    /// Applied to the ledger (terminal)
    Success,
}

impl TransactionStatus {
    /// String form used in persistence and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
        }
    }
}

/// One entry in the append-only transaction log
///
/// A correction is a new offsetting transaction, never a mutation of an
/// existing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id
    pub id: TransactionId,
    /// Affected user
    pub user_id: UserId,
    /// Affected asset
    pub asset_id: AssetId,
    /// Event type
    pub tx_type: TransactionType,
    /// Moved amount, always positive; sign comes from the type
    pub amount: Decimal,
    /// Counter asset for trades/swaps
    pub quote_asset_id: Option<AssetId>,
    /// Execution price/rate for trades/swaps
    pub price: Option<Decimal>,
    /// Lifecycle status
    pub status: TransactionStatus,
    /// External reference (e.g. chain tx hash on deposits)
    pub external_reference: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a SUCCESS transaction recording an applied balance movement
    pub fn applied(
        user_id: UserId,
        asset_id: AssetId,
        tx_type: TransactionType,
        amount: Amount,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            asset_id,
            tx_type,
            amount: amount.as_decimal(),
            quote_asset_id: None,
            price: None,
            status: TransactionStatus::Success,
            external_reference: None,
            created_at: Utc::now(),
        }
    }

    /// Create a PENDING deposit claim (no ledger effect until confirmed)
    pub fn pending_deposit(
        user_id: UserId,
        asset_id: AssetId,
        amount: Amount,
        external_reference: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            asset_id,
            tx_type: TransactionType::Deposit,
            amount: amount.as_decimal(),
            quote_asset_id: None,
            price: None,
            status: TransactionStatus::Pending,
            external_reference,
            created_at: Utc::now(),
        }
    }

    /// Attach trade context (counter asset and execution price)
    pub fn with_trade_context(mut self, quote_asset_id: AssetId, price: Decimal) -> Self {
        self.quote_asset_id = Some(quote_asset_id);
        self.price = Some(price);
        self
    }

    /// Flip PENDING -> SUCCESS (confirmation workflow)
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStateTransition` if the transaction is
    /// not a pending deposit.
    pub fn confirm(&mut self) -> Result<(), DomainError> {
        if self.tx_type != TransactionType::Deposit {
            return Err(DomainError::InvalidStateTransition(format!(
                "Only deposits can be confirmed, got {}",
                self.tx_type
            )));
        }
        if self.status != TransactionStatus::Pending {
            return Err(DomainError::InvalidStateTransition(
                "Deposit is not pending".to_string(),
            ));
        }
        self.status = TransactionStatus::Success;
        Ok(())
    }

    /// Signed amount for ledger reconciliation (positive credit, negative debit)
    ///
    /// Only meaningful for SUCCESS rows; pending deposits have no ledger
    /// effect and reconciliation must skip them.
    pub fn signed_amount(&self) -> Decimal {
        self.amount * self.tx_type.direction().sign()
    }
}

// =============================================================================
// Order
// =============================================================================

/// Status of an order in the book
///
/// OPEN -> FILLED | CANCELLED, both terminal. There is no partial state:
/// partially filled orders stay OPEN with reduced remaining amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Resting in the book
    Open,
    /// Fully matched (terminal)
    Filled,
    /// Cancelled by its owner or force-cancelled at settlement (terminal)
    Cancelled,
}

impl OrderStatus {
    /// String form used in persistence and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

/// A limit order resting in the book
///
/// # Invariants
/// - `amount` (remaining) monotonically decreases toward zero, never negative
/// - Mutated only by the matching algorithm or an explicit cancel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order id
    pub id: OrderId,
    /// Owning user
    pub user_id: UserId,
    /// Traded pair
    pub pair: AssetPair,
    /// Buy or sell the base asset
    pub side: OrderSide,
    /// Remaining amount of the base asset
    pub amount: Decimal,
    /// Limit price in the quote asset
    pub price: Decimal,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Creation time (FIFO tie-break at equal price)
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a new open order
    pub fn new(user_id: UserId, pair: AssetPair, side: OrderSide, amount: Amount, price: Price) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            pair,
            side,
            amount: amount.as_decimal(),
            price: price.as_decimal(),
            status: OrderStatus::Open,
            created_at: Utc::now(),
        }
    }

    /// Whether the order can still match or be cancelled
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// Reduce the remaining amount by a matched quantity
    ///
    /// Transitions to FILLED when the remaining amount reaches zero.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidFill` if the order is not open, the
    /// quantity is not positive, or it exceeds the remaining amount.
    pub fn fill(&mut self, quantity: Decimal) -> Result<(), DomainError> {
        if !self.is_open() {
            return Err(DomainError::InvalidFill(format!(
                "Cannot fill {} order",
                self.status.as_str()
            )));
        }
        if quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidFill("Fill quantity must be positive".to_string()));
        }
        if quantity > self.amount {
            return Err(DomainError::InvalidFill(format!(
                "Fill quantity {} exceeds remaining {}",
                quantity, self.amount
            )));
        }

        self.amount -= quantity;
        if self.amount.is_zero() {
            self.status = OrderStatus::Filled;
        }
        Ok(())
    }

    /// Transition OPEN -> CANCELLED
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStateTransition` if the order is not open.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        if !self.is_open() {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot cancel {} order",
                self.status.as_str()
            )));
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }
}

// =============================================================================
// ExchangeRate
// =============================================================================

/// Append-only exchange rate snapshot
///
/// The current price for a pair is the most recent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Base asset
    pub base_asset_id: AssetId,
    /// Quote asset
    pub quote_asset_id: AssetId,
    /// Units of quote per unit of base
    pub rate: Decimal,
    /// Where the rate came from (oracle name, "book", ...)
    pub source: String,
    /// Snapshot time
    pub as_of: DateTime<Utc>,
}

impl ExchangeRate {
    /// Record a rate snapshot taken now
    pub fn snapshot(base_asset_id: AssetId, quote_asset_id: AssetId, rate: Rate, source: &str) -> Self {
        Self {
            base_asset_id,
            quote_asset_id,
            rate: rate.as_decimal(),
            source: source.to_string(),
            as_of: Utc::now(),
        }
    }
}

// =============================================================================
// StakingPosition
// =============================================================================

/// A staked amount earning yield
///
/// Created on stake, deleted on unstake (funds return to the holding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingPosition {
    /// Position id
    pub id: StakeId,
    /// Owning user
    pub user_id: UserId,
    /// Staked asset
    pub asset_id: AssetId,
    /// Staked amount (> 0)
    pub amount: Decimal,
    /// Annual percentage yield, e.g. 0.05 = 5%
    pub apy: Decimal,
    /// Earliest unstake time, if locked
    pub locked_until: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl StakingPosition {
    /// Create a new staking position
    pub fn new(
        user_id: UserId,
        asset_id: AssetId,
        amount: Amount,
        apy: Decimal,
        locked_until: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            asset_id,
            amount: amount.as_decimal(),
            apy,
            locked_until,
            created_at: Utc::now(),
        }
    }

    /// Whether the position is still locked at `now`
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| now < until).unwrap_or(false)
    }
}

// =============================================================================
// Tests
// =============================================================================
