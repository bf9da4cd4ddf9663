//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the ledger core.
//! Implementations can be PostgreSQL or in-memory for testing. Compound
//! operations (`apply`, `confirm_deposit`, `commit_match`, stake open/close)
//! are atomic: they fully succeed or leave no observable change.

use crate::batch::LedgerBatch;
use crate::error::StoreError;
use crate::query::HistoryQuery;
use async_trait::async_trait;
use obol_domain::{
    Asset, AssetId, AssetPair, ExchangeRate, Holding, Order, OrderId, OrderSide, StakeId,
    StakingPosition, Transaction, TransactionId, UserId,
};
use rust_decimal::Decimal;

/// Repository for Asset reference data
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Insert a new asset (fails on duplicate symbol)
    async fn insert_asset(&self, asset: &Asset) -> Result<(), StoreError>;

    /// Find an asset by id, including inactive ones
    async fn find_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError>;

    /// Find an active asset by case-insensitive symbol
    async fn find_asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>, StoreError>;

    /// List all active assets
    async fn list_active_assets(&self) -> Result<Vec<Asset>, StoreError>;

    /// Soft-delete an asset
    async fn deactivate_asset(&self, id: AssetId) -> Result<(), StoreError>;
}

/// Read access to Holding rows (mutation goes through the ledger)
#[async_trait]
pub trait HoldingRepository: Send + Sync {
    /// Available balance for (user, asset); zero if no holding exists
    async fn balance(&self, user_id: UserId, asset_id: AssetId) -> Result<Decimal, StoreError>;

    /// All holdings for a user
    async fn holdings_for_user(&self, user_id: UserId) -> Result<Vec<Holding>, StoreError>;

    /// Sum of all holdings of one asset (conservation checks)
    async fn total_for_asset(&self, asset_id: AssetId) -> Result<Decimal, StoreError>;
}

/// The Holdings Ledger: the only write path for balances
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Apply a batch of postings atomically
    ///
    /// Every debit is validated against the working balance before anything
    /// is written; on `InsufficientBalance` no balance moves and no
    /// transaction row is appended. Returns the appended SUCCESS rows in
    /// posting order.
    async fn apply(&self, batch: &LedgerBatch) -> Result<Vec<Transaction>, StoreError>;

    /// Insert a PENDING deposit claim (no balance effect)
    ///
    /// If the claim carries an external reference and a PENDING deposit with
    /// the same (user, asset, reference) already exists, that existing row is
    /// returned instead of inserting a duplicate.
    async fn submit_deposit(&self, deposit: &Transaction) -> Result<Transaction, StoreError>;

    /// Confirm a pending deposit: flip PENDING -> SUCCESS and credit the
    /// holding, atomically
    ///
    /// # Errors
    /// - `NotFound` if no transaction has this id
    /// - `InvalidState` if the transaction is not a PENDING deposit
    async fn confirm_deposit(&self, id: TransactionId) -> Result<Transaction, StoreError>;
}

/// Read access to the append-only transaction log
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Find a transaction by id
    async fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// A user's transaction history, filtered and paginated
    async fn history(&self, user_id: UserId, query: &HistoryQuery) -> Result<Vec<Transaction>, StoreError>;
}

/// Result of committing one match step
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Buy order after the fill
    pub buy: Order,
    /// Sell order after the fill
    pub sell: Order,
    /// Settlement transaction rows, in posting order
    pub transactions: Vec<Transaction>,
}

/// Repository for order-book entries
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new open order
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Find an order by id
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Open orders for a pair and side, best price first
    ///
    /// Buy side: highest price first. Sell side: lowest price first.
    /// Ties break FIFO by creation time.
    async fn open_orders(&self, pair: AssetPair, side: OrderSide) -> Result<Vec<Order>, StoreError>;

    /// All orders for a user, newest first
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// Cancel an order if it belongs to `user_id` and is still open
    ///
    /// Returns `false` (not an error) when the order is missing, owned by
    /// someone else, or already terminal. No holding is touched: funds are
    /// never escrowed at placement.
    async fn cancel_order(&self, user_id: UserId, id: OrderId) -> Result<bool, StoreError>;

    /// Commit one match step atomically: apply the settlement batch and
    /// decrement both orders by `quantity`, flipping either to FILLED at zero
    ///
    /// On any failure (including `InsufficientBalance` on a settlement leg)
    /// nothing is applied and both orders keep their pre-match state.
    async fn commit_match(
        &self,
        buy_id: OrderId,
        sell_id: OrderId,
        quantity: Decimal,
        settlement: &LedgerBatch,
    ) -> Result<MatchOutcome, StoreError>;
}

/// Repository for exchange rate snapshots
#[async_trait]
pub trait RateRepository: Send + Sync {
    /// Append a rate snapshot
    async fn append_rate(&self, rate: &ExchangeRate) -> Result<(), StoreError>;

    /// Most recent snapshot for (base, quote)
    async fn latest_rate(
        &self,
        base_asset_id: AssetId,
        quote_asset_id: AssetId,
    ) -> Result<Option<ExchangeRate>, StoreError>;
}

/// Repository for staking positions
#[async_trait]
pub trait StakingRepository: Send + Sync {
    /// Create a staking position and apply its funding batch atomically
    async fn open_stake(
        &self,
        position: &StakingPosition,
        batch: &LedgerBatch,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Delete a staking position and apply its release batch atomically
    async fn close_stake(
        &self,
        id: StakeId,
        batch: &LedgerBatch,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Find a staking position by id
    async fn find_stake(&self, id: StakeId) -> Result<Option<StakingPosition>, StoreError>;

    /// All staking positions for a user
    async fn stakes_for_user(&self, user_id: UserId) -> Result<Vec<StakingPosition>, StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get asset repository
    fn assets(&self) -> &dyn AssetRepository;

    /// Get holding repository
    fn holdings(&self) -> &dyn HoldingRepository;

    /// Get the holdings ledger
    fn ledger(&self) -> &dyn LedgerRepository;

    /// Get transaction log reader
    fn transactions(&self) -> &dyn TransactionRepository;

    /// Get order repository
    fn orders(&self) -> &dyn OrderRepository;

    /// Get rate repository
    fn rates(&self) -> &dyn RateRepository;

    /// Get staking repository
    fn staking(&self) -> &dyn StakingRepository;
}
