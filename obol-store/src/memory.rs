//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! A single store-wide mutex makes every compound operation atomic: batch
//! validation and application happen under one lock, so no observer can see
//! a half-applied balance movement.

use crate::batch::LedgerBatch;
use crate::error::StoreError;
use crate::query::{HistoryQuery, HistorySort};
use crate::repository::{
    AssetRepository, HoldingRepository, LedgerRepository, MatchOutcome, OrderRepository,
    RateRepository, StakingRepository, Store, TransactionRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use obol_domain::{
    Asset, AssetId, AssetPair, ExchangeRate, Holding, Order, OrderId, OrderSide, StakeId,
    StakingPosition, Transaction, TransactionId, TransactionStatus, TransactionType, UserId,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory store for testing and development
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    assets: HashMap<AssetId, Asset>,
    holdings: HashMap<(UserId, AssetId), Holding>,
    transactions: Vec<Transaction>,
    orders: HashMap<OrderId, Order>,
    rates: Vec<ExchangeRate>,
    stakes: HashMap<StakeId, StakingPosition>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Get the number of holdings
    pub fn holding_count(&self) -> usize {
        self.inner.lock().unwrap().holdings.len()
    }

    /// Get the number of transaction rows
    pub fn transaction_count(&self) -> usize {
        self.inner.lock().unwrap().transactions.len()
    }

    /// Get the number of orders
    pub fn order_count(&self) -> usize {
        self.inner.lock().unwrap().orders.len()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::default();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Validate a batch against working balances, then apply it.
    ///
    /// Order is critical: validate everything FIRST, write AFTER. Postings
    /// are validated sequentially against a working copy, so a debit may
    /// consume a credit from earlier in the same batch.
    fn validate_and_apply(&mut self, batch: &LedgerBatch) -> Result<Vec<Transaction>, StoreError> {
        let mut working: HashMap<(UserId, AssetId), Decimal> = HashMap::new();

        for posting in batch.postings() {
            let key = (posting.user_id, posting.asset_id);
            let balance = working.entry(key).or_insert_with(|| {
                self.holdings
                    .get(&key)
                    .map(|h| h.available)
                    .unwrap_or(Decimal::ZERO)
            });

            let next = *balance + posting.signed_amount();
            if next < Decimal::ZERO {
                return Err(StoreError::InsufficientBalance {
                    user_id: posting.user_id,
                    asset_id: posting.asset_id,
                    available: *balance,
                    requested: posting.amount.as_decimal(),
                });
            }
            *balance = next;
        }

        // Commit: balances first, then the log rows
        let now = Utc::now();
        for ((user_id, asset_id), available) in working {
            self.holdings
                .entry((user_id, asset_id))
                .and_modify(|h| {
                    h.available = available;
                    h.updated_at = now;
                })
                .or_insert_with(|| Holding::new(user_id, asset_id, available));
        }

        let mut committed = Vec::with_capacity(batch.len());
        for posting in batch.postings() {
            let tx = posting.to_transaction();
            self.transactions.push(tx.clone());
            committed.push(tx);
        }

        Ok(committed)
    }

    fn credit_holding(&mut self, user_id: UserId, asset_id: AssetId, amount: Decimal) {
        let now = Utc::now();
        self.holdings
            .entry((user_id, asset_id))
            .and_modify(|h| {
                h.available += amount;
                h.updated_at = now;
            })
            .or_insert_with(|| Holding::new(user_id, asset_id, amount));
    }
}

// =============================================================================
// Asset Repository Implementation
// =============================================================================

#[async_trait]
impl AssetRepository for MemoryStore {
    async fn insert_asset(&self, asset: &Asset) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.assets.values().any(|a| a.matches_symbol(&asset.symbol)) {
            return Err(StoreError::duplicate("asset", asset.symbol.clone()));
        }
        inner.assets.insert(asset.id, asset.clone());
        Ok(())
    }

    async fn find_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.assets.get(&id).cloned())
    }

    async fn find_asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .assets
            .values()
            .find(|a| a.active && a.matches_symbol(symbol))
            .cloned())
    }

    async fn list_active_assets(&self) -> Result<Vec<Asset>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut assets: Vec<Asset> = inner.assets.values().filter(|a| a.active).cloned().collect();
        assets.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(assets)
    }

    async fn deactivate_asset(&self, id: AssetId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.assets.get_mut(&id) {
            Some(asset) => {
                asset.deactivate();
                Ok(())
            },
            None => Err(StoreError::not_found("asset", id.to_string())),
        }
    }
}

// =============================================================================
// Holding Repository Implementation
// =============================================================================

#[async_trait]
impl HoldingRepository for MemoryStore {
    async fn balance(&self, user_id: UserId, asset_id: AssetId) -> Result<Decimal, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .holdings
            .get(&(user_id, asset_id))
            .map(|h| h.available)
            .unwrap_or(Decimal::ZERO))
    }

    async fn holdings_for_user(&self, user_id: UserId) -> Result<Vec<Holding>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .holdings
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn total_for_asset(&self, asset_id: AssetId) -> Result<Decimal, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .holdings
            .values()
            .filter(|h| h.asset_id == asset_id)
            .map(|h| h.available)
            .sum())
    }
}

// =============================================================================
// Ledger Repository Implementation
// =============================================================================

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn apply(&self, batch: &LedgerBatch) -> Result<Vec<Transaction>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.validate_and_apply(batch)
    }

    async fn submit_deposit(&self, deposit: &Transaction) -> Result<Transaction, StoreError> {
        if deposit.tx_type != TransactionType::Deposit || deposit.status != TransactionStatus::Pending {
            return Err(StoreError::invalid_state("Only pending deposits can be submitted"));
        }

        let mut inner = self.inner.lock().unwrap();

        // External-reference dedup: resubmitting the same claim returns the
        // existing pending row instead of double-recording it.
        if deposit.external_reference.is_some() {
            if let Some(existing) = inner.transactions.iter().find(|tx| {
                tx.user_id == deposit.user_id
                    && tx.asset_id == deposit.asset_id
                    && tx.tx_type == TransactionType::Deposit
                    && tx.status == TransactionStatus::Pending
                    && tx.external_reference == deposit.external_reference
            }) {
                return Ok(existing.clone());
            }
        }

        inner.transactions.push(deposit.clone());
        Ok(deposit.clone())
    }

    async fn confirm_deposit(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let position = inner
            .transactions
            .iter()
            .position(|tx| tx.id == id)
            .ok_or_else(|| StoreError::not_found("transaction", id.to_string()))?;

        // Validate the transition on a copy, then commit status + credit
        // together under the same lock.
        let mut confirmed = inner.transactions[position].clone();
        confirmed
            .confirm()
            .map_err(|e| StoreError::invalid_state(e.to_string()))?;

        inner.transactions[position] = confirmed.clone();
        inner.credit_holding(confirmed.user_id, confirmed.asset_id, confirmed.amount);

        Ok(confirmed)
    }
}

// =============================================================================
// Transaction Repository Implementation
// =============================================================================

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.transactions.iter().find(|tx| tx.id == id).cloned())
    }

    async fn history(&self, user_id: UserId, query: &HistoryQuery) -> Result<Vec<Transaction>, StoreError> {
        let inner = self.inner.lock().unwrap();

        let mut entries: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id && query.matches(tx))
            .cloned()
            .collect();

        entries.sort_by(|a, b| {
            let ord = match query.sort {
                HistorySort::Time => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
                HistorySort::TradeValue => HistoryQuery::trade_value(a)
                    .cmp(&HistoryQuery::trade_value(b))
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id)),
            };
            if query.ascending { ord } else { ord.reverse() }
        });

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let entries: Vec<Transaction> = match query.limit {
            Some(limit) => entries.into_iter().skip(offset).take(limit.max(0) as usize).collect(),
            None => entries.into_iter().skip(offset).collect(),
        };

        Ok(entries)
    }
}

// =============================================================================
// Order Repository Implementation
// =============================================================================

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.orders.get(&id).cloned())
    }

    async fn open_orders(&self, pair: AssetPair, side: OrderSide) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();

        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.is_open() && o.pair == pair && o.side == side)
            .cloned()
            .collect();

        // Best price first, FIFO at equal price
        orders.sort_by(|a, b| {
            let by_price = match side {
                OrderSide::Buy => b.price.cmp(&a.price),
                OrderSide::Sell => a.price.cmp(&b.price),
            };
            by_price.then(a.created_at.cmp(&b.created_at)).then(a.id.cmp(&b.id))
        });

        Ok(orders)
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn cancel_order(&self, user_id: UserId, id: OrderId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.orders.get_mut(&id) {
            Some(order) if order.user_id == user_id && order.is_open() => {
                order.cancel().map_err(StoreError::Domain)?;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn commit_match(
        &self,
        buy_id: OrderId,
        sell_id: OrderId,
        quantity: Decimal,
        settlement: &LedgerBatch,
    ) -> Result<MatchOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let mut buy = inner
            .orders
            .get(&buy_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", buy_id.to_string()))?;
        let mut sell = inner
            .orders
            .get(&sell_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", sell_id.to_string()))?;

        if !buy.is_open() || !sell.is_open() {
            return Err(StoreError::invalid_state("Both orders must be open to match"));
        }

        // Validate the fills on copies before any write
        buy.fill(quantity).map_err(StoreError::Domain)?;
        sell.fill(quantity).map_err(StoreError::Domain)?;

        // Settlement first: an InsufficientBalance here aborts the whole
        // step with both orders untouched.
        let transactions = inner.validate_and_apply(settlement)?;

        inner.orders.insert(buy.id, buy.clone());
        inner.orders.insert(sell.id, sell.clone());

        Ok(MatchOutcome { buy, sell, transactions })
    }
}

// =============================================================================
// Rate Repository Implementation
// =============================================================================

#[async_trait]
impl RateRepository for MemoryStore {
    async fn append_rate(&self, rate: &ExchangeRate) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.rates.push(rate.clone());
        Ok(())
    }

    async fn latest_rate(
        &self,
        base_asset_id: AssetId,
        quote_asset_id: AssetId,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rates
            .iter()
            .filter(|r| r.base_asset_id == base_asset_id && r.quote_asset_id == quote_asset_id)
            .max_by_key(|r| r.as_of)
            .cloned())
    }
}

// =============================================================================
// Staking Repository Implementation
// =============================================================================

#[async_trait]
impl StakingRepository for MemoryStore {
    async fn open_stake(
        &self,
        position: &StakingPosition,
        batch: &LedgerBatch,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let transactions = inner.validate_and_apply(batch)?;
        inner.stakes.insert(position.id, position.clone());
        Ok(transactions)
    }

    async fn close_stake(&self, id: StakeId, batch: &LedgerBatch) -> Result<Vec<Transaction>, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.stakes.contains_key(&id) {
            return Err(StoreError::not_found("stake", id.to_string()));
        }

        let transactions = inner.validate_and_apply(batch)?;
        inner.stakes.remove(&id);
        Ok(transactions)
    }

    async fn find_stake(&self, id: StakeId) -> Result<Option<StakingPosition>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.stakes.get(&id).cloned())
    }

    async fn stakes_for_user(&self, user_id: UserId) -> Result<Vec<StakingPosition>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .stakes
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn assets(&self) -> &dyn AssetRepository {
        self
    }

    fn holdings(&self) -> &dyn HoldingRepository {
        self
    }

    fn ledger(&self) -> &dyn LedgerRepository {
        self
    }

    fn transactions(&self) -> &dyn TransactionRepository {
        self
    }

    fn orders(&self) -> &dyn OrderRepository {
        self
    }

    fn rates(&self) -> &dyn RateRepository {
        self
    }

    fn staking(&self) -> &dyn StakingRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
