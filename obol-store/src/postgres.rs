//! PostgreSQL store implementation.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.
//!
//! Concurrency model: every compound operation runs inside one SQL
//! transaction. Holding rows are created with a zero-balance
//! `INSERT ... ON CONFLICT DO NOTHING` and then locked with
//! `SELECT ... FOR UPDATE` in canonical (user_id, asset_id) order, so two
//! concurrent batches touching the same holdings serialize instead of
//! deadlocking.

use crate::batch::LedgerBatch;
use crate::error::StoreError;
use crate::query::{HistoryQuery, HistorySort};
use crate::repository::{
    AssetRepository, HoldingRepository, LedgerRepository, MatchOutcome, OrderRepository,
    RateRepository, StakingRepository, Store, TransactionRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use obol_domain::{
    Asset, AssetId, AssetKind, AssetPair, ExchangeRate, Holding, Order, OrderId, OrderSide,
    OrderStatus, StakeId, StakingPosition, Transaction, TransactionId, TransactionStatus,
    TransactionType, UserId,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

type PgTx<'a> = sqlx::Transaction<'a, Postgres>;

/// PostgreSQL-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PostgreSQL store around an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Row parsing helpers
// =============================================================================

fn parse_asset_row(row: &sqlx::postgres::PgRow) -> Result<Asset, StoreError> {
    let kind: String = row.try_get("kind")?;
    let kind = match kind.as_str() {
        "crypto" => AssetKind::Crypto,
        "fiat" => AssetKind::Fiat,
        other => return Err(StoreError::Serialization(format!("Invalid asset kind: {}", other))),
    };
    let decimals: i32 = row.try_get("decimals")?;

    Ok(Asset {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        decimals: decimals as u32,
        kind,
        active: row.try_get("active")?,
    })
}

fn parse_holding_row(row: &sqlx::postgres::PgRow) -> Result<Holding, StoreError> {
    Ok(Holding {
        user_id: row.try_get("user_id")?,
        asset_id: row.try_get("asset_id")?,
        available: row.try_get("available")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_transaction_row(row: &sqlx::postgres::PgRow) -> Result<Transaction, StoreError> {
    let tx_type: String = row.try_get("tx_type")?;
    let tx_type = TransactionType::parse(&tx_type)
        .ok_or_else(|| StoreError::Serialization(format!("Invalid transaction type: {}", tx_type)))?;

    let status: String = row.try_get("status")?;
    let status = match status.as_str() {
        "pending" => TransactionStatus::Pending,
        "success" => TransactionStatus::Success,
        other => return Err(StoreError::Serialization(format!("Invalid transaction status: {}", other))),
    };

    Ok(Transaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        asset_id: row.try_get("asset_id")?,
        tx_type,
        amount: row.try_get("amount")?,
        quote_asset_id: row.try_get("quote_asset_id")?,
        price: row.try_get::<Option<Decimal>, _>("price")?,
        status,
        external_reference: row.try_get("external_reference")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_order_row(row: &sqlx::postgres::PgRow) -> Result<Order, StoreError> {
    let side: String = row.try_get("side")?;
    let side = match side.as_str() {
        "buy" => OrderSide::Buy,
        "sell" => OrderSide::Sell,
        other => return Err(StoreError::Serialization(format!("Invalid order side: {}", other))),
    };

    let status: String = row.try_get("status")?;
    let status = match status.as_str() {
        "open" => OrderStatus::Open,
        "filled" => OrderStatus::Filled,
        "cancelled" => OrderStatus::Cancelled,
        other => return Err(StoreError::Serialization(format!("Invalid order status: {}", other))),
    };

    let base: Uuid = row.try_get("base_asset_id")?;
    let quote: Uuid = row.try_get("quote_asset_id")?;
    let pair = AssetPair::new(base, quote)
        .map_err(|e| StoreError::Serialization(format!("Invalid pair {}/{}: {}", base, quote, e)))?;

    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        pair,
        side,
        amount: row.try_get("amount")?,
        price: row.try_get("price")?,
        status,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_rate_row(row: &sqlx::postgres::PgRow) -> Result<ExchangeRate, StoreError> {
    Ok(ExchangeRate {
        base_asset_id: row.try_get("base_asset_id")?,
        quote_asset_id: row.try_get("quote_asset_id")?,
        rate: row.try_get("rate")?,
        source: row.try_get("source")?,
        as_of: row.try_get("as_of")?,
    })
}

fn parse_stake_row(row: &sqlx::postgres::PgRow) -> Result<StakingPosition, StoreError> {
    Ok(StakingPosition {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        asset_id: row.try_get("asset_id")?,
        amount: row.try_get("amount")?,
        apy: row.try_get("apy")?,
        locked_until: row.try_get::<Option<DateTime<Utc>>, _>("locked_until")?,
        created_at: row.try_get("created_at")?,
    })
}

// =============================================================================
// Batch application
// =============================================================================

/// Apply a ledger batch inside an open SQL transaction.
///
/// Locks the touched holding rows in canonical key order, validates every
/// posting against working balances (a debit may consume a credit from
/// earlier in the same batch), then writes the new balances and the
/// transaction rows. The caller commits; any error leaves the transaction
/// to roll back.
async fn apply_batch_tx(tx: &mut PgTx<'_>, batch: &LedgerBatch) -> Result<Vec<Transaction>, StoreError> {
    let mut keys: Vec<(UserId, AssetId)> = batch
        .postings()
        .iter()
        .map(|p| (p.user_id, p.asset_id))
        .collect();
    keys.sort();
    keys.dedup();

    let mut balances: HashMap<(UserId, AssetId), Decimal> = HashMap::new();

    for (user_id, asset_id) in &keys {
        // Ensure the row exists so FOR UPDATE has something to lock, then
        // lock it. The zero row is harmless if the batch later fails: a
        // zero balance is indistinguishable from no holding.
        sqlx::query(
            "INSERT INTO holdings (user_id, asset_id, available, updated_at)
             VALUES ($1, $2, 0, now())
             ON CONFLICT (user_id, asset_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(asset_id)
        .execute(&mut **tx)
        .await?;

        let row = sqlx::query(
            "SELECT available FROM holdings WHERE user_id = $1 AND asset_id = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(asset_id)
        .fetch_one(&mut **tx)
        .await?;

        balances.insert((*user_id, *asset_id), row.try_get("available")?);
    }

    for posting in batch.postings() {
        let key = (posting.user_id, posting.asset_id);
        let balance = balances.get_mut(&key).ok_or_else(|| {
            StoreError::Database("Holding lock missing for batch key".to_string())
        })?;

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

    for ((user_id, asset_id), available) in &balances {
        sqlx::query(
            "UPDATE holdings SET available = $3, updated_at = now()
             WHERE user_id = $1 AND asset_id = $2",
        )
        .bind(user_id)
        .bind(asset_id)
        .bind(available)
        .execute(&mut **tx)
        .await?;
    }

    let mut committed = Vec::with_capacity(batch.len());
    for posting in batch.postings() {
        let record = posting.to_transaction();
        insert_transaction_tx(tx, &record).await?;
        committed.push(record);
    }

    debug!(postings = committed.len(), holdings = keys.len(), "Ledger batch applied");
    Ok(committed)
}

async fn insert_transaction_tx(tx: &mut PgTx<'_>, record: &Transaction) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO transactions
            (id, user_id, asset_id, tx_type, amount, quote_asset_id, price, status, external_reference, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(record.asset_id)
    .bind(record.tx_type.as_str())
    .bind(record.amount)
    .bind(record.quote_asset_id)
    .bind(record.price)
    .bind(record.status.as_str())
    .bind(record.external_reference.as_deref())
    .bind(record.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// =============================================================================
// Asset Repository Implementation
// =============================================================================

#[async_trait]
impl AssetRepository for PgStore {
    async fn insert_asset(&self, asset: &Asset) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO assets (id, symbol, decimals, kind, active)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(asset.id)
        .bind(&asset.symbol)
        .bind(asset.decimals as i32)
        .bind(asset.kind.as_str())
        .bind(asset.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        let row = sqlx::query("SELECT * FROM assets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_asset_row).transpose()
    }

    async fn find_asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>, StoreError> {
        let row = sqlx::query("SELECT * FROM assets WHERE symbol = upper($1) AND active")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_asset_row).transpose()
    }

    async fn list_active_assets(&self) -> Result<Vec<Asset>, StoreError> {
        let rows = sqlx::query("SELECT * FROM assets WHERE active ORDER BY symbol ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_asset_row).collect()
    }

    async fn deactivate_asset(&self, id: AssetId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE assets SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("asset", id.to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Holding Repository Implementation
// =============================================================================

#[async_trait]
impl HoldingRepository for PgStore {
    async fn balance(&self, user_id: UserId, asset_id: AssetId) -> Result<Decimal, StoreError> {
        let row = sqlx::query(
            "SELECT available FROM holdings WHERE user_id = $1 AND asset_id = $2",
        )
        .bind(user_id)
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.try_get("available")?),
            None => Ok(Decimal::ZERO),
        }
    }

    async fn holdings_for_user(&self, user_id: UserId) -> Result<Vec<Holding>, StoreError> {
        let rows = sqlx::query("SELECT * FROM holdings WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_holding_row).collect()
    }

    async fn total_for_asset(&self, asset_id: AssetId) -> Result<Decimal, StoreError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(available), 0) AS total FROM holdings WHERE asset_id = $1",
        )
        .bind(asset_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }
}

// =============================================================================
// Ledger Repository Implementation
// =============================================================================

#[async_trait]
impl LedgerRepository for PgStore {
    async fn apply(&self, batch: &LedgerBatch) -> Result<Vec<Transaction>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let committed = apply_batch_tx(&mut tx, batch).await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn submit_deposit(&self, deposit: &Transaction) -> Result<Transaction, StoreError> {
        if deposit.tx_type != TransactionType::Deposit || deposit.status != TransactionStatus::Pending {
            return Err(StoreError::invalid_state("Only pending deposits can be submitted"));
        }

        let mut tx = self.pool.begin().await?;
        let result = insert_transaction_tx(&mut tx, deposit).await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(deposit.clone())
            },
            // The partial unique index on (user_id, asset_id,
            // external_reference) WHERE status = 'pending' turns a resubmit
            // into a unique violation. Return the existing claim instead.
            Err(StoreError::Duplicate { .. }) if deposit.external_reference.is_some() => {
                drop(tx);
                let row = sqlx::query(
                    "SELECT * FROM transactions
                     WHERE user_id = $1 AND asset_id = $2 AND external_reference = $3
                       AND tx_type = 'deposit' AND status = 'pending'",
                )
                .bind(deposit.user_id)
                .bind(deposit.asset_id)
                .bind(deposit.external_reference.as_deref())
                .fetch_one(&self.pool)
                .await?;
                parse_transaction_row(&row)
            },
            Err(e) => Err(e),
        }
    }

    async fn confirm_deposit(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the transaction row so concurrent confirmations serialize;
        // the loser then fails the pending-status check.
        let row = sqlx::query("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("transaction", id.to_string()))?;

        let mut record = parse_transaction_row(&row)?;
        record
            .confirm()
            .map_err(|e| StoreError::invalid_state(e.to_string()))?;

        sqlx::query("UPDATE transactions SET status = 'success' WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO holdings (user_id, asset_id, available, updated_at)
             VALUES ($1, $2, 0, now())
             ON CONFLICT (user_id, asset_id) DO NOTHING",
        )
        .bind(record.user_id)
        .bind(record.asset_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE holdings SET available = available + $3, updated_at = now()
             WHERE user_id = $1 AND asset_id = $2",
        )
        .bind(record.user_id)
        .bind(record.asset_id)
        .bind(record.amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }
}

// =============================================================================
// Transaction Repository Implementation
// =============================================================================

#[async_trait]
impl TransactionRepository for PgStore {
    async fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_transaction_row).transpose()
    }

    async fn history(&self, user_id: UserId, query: &HistoryQuery) -> Result<Vec<Transaction>, StoreError> {
        // Build the query dynamically based on the filters present
        let mut sql = String::from("SELECT * FROM transactions WHERE user_id = $1");
        let mut bind_count = 1;

        if query.tx_type.is_some() {
            bind_count += 1;
            sql.push_str(&format!(" AND tx_type = ${}", bind_count));
        }
        if query.status.is_some() {
            bind_count += 1;
            sql.push_str(&format!(" AND status = ${}", bind_count));
        }
        if query.asset_id.is_some() {
            bind_count += 1;
            sql.push_str(&format!(" AND asset_id = ${}", bind_count));
        }
        if query.from_time.is_some() {
            bind_count += 1;
            sql.push_str(&format!(" AND created_at >= ${}", bind_count));
        }
        if query.to_time.is_some() {
            bind_count += 1;
            sql.push_str(&format!(" AND created_at < ${}", bind_count));
        }

        let dir = if query.ascending { "ASC" } else { "DESC" };
        match query.sort {
            HistorySort::Time => {
                sql.push_str(&format!(" ORDER BY created_at {dir}, id {dir}"));
            },
            HistorySort::TradeValue => {
                // Signed amount * price; rows without a price sort as zero
                sql.push_str(&format!(
                    " ORDER BY (COALESCE(amount * price, 0) * \
                     (CASE WHEN tx_type IN ('deposit', 'trade_buy', 'unstake', 'transfer_in') \
                     THEN 1 ELSE -1 END)) {dir}, created_at {dir}, id {dir}"
                ));
            },
        }

        if query.limit.is_some() {
            bind_count += 1;
            sql.push_str(&format!(" LIMIT ${}", bind_count));
        }
        if query.offset.is_some() {
            bind_count += 1;
            sql.push_str(&format!(" OFFSET ${}", bind_count));
        }

        let mut q = sqlx::query(&sql).bind(user_id);
        if let Some(tx_type) = query.tx_type {
            q = q.bind(tx_type.as_str());
        }
        if let Some(status) = query.status {
            q = q.bind(status.as_str());
        }
        if let Some(asset_id) = query.asset_id {
            q = q.bind(asset_id);
        }
        if let Some(from_time) = query.from_time {
            q = q.bind(from_time);
        }
        if let Some(to_time) = query.to_time {
            q = q.bind(to_time);
        }
        if let Some(limit) = query.limit {
            q = q.bind(limit);
        }
        if let Some(offset) = query.offset {
            q = q.bind(offset);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(parse_transaction_row).collect()
    }
}

// =============================================================================
// Order Repository Implementation
// =============================================================================

async fn lock_order_tx(tx: &mut PgTx<'_>, id: OrderId) -> Result<Order, StoreError> {
    let row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::not_found("order", id.to_string()))?;
    parse_order_row(&row)
}

async fn update_order_tx(tx: &mut PgTx<'_>, order: &Order) -> Result<(), StoreError> {
    sqlx::query("UPDATE orders SET amount = $2, status = $3 WHERE id = $1")
        .bind(order.id)
        .bind(order.amount)
        .bind(order.status.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders
                (id, user_id, base_asset_id, quote_asset_id, side, amount, price, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.pair.base())
        .bind(order.pair.quote())
        .bind(order.side.as_str())
        .bind(order.amount)
        .bind(order.price)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_order_row).transpose()
    }

    async fn open_orders(&self, pair: AssetPair, side: OrderSide) -> Result<Vec<Order>, StoreError> {
        // Best price first: highest bid, lowest ask. FIFO at equal price.
        let price_order = match side {
            OrderSide::Buy => "DESC",
            OrderSide::Sell => "ASC",
        };
        let sql = format!(
            "SELECT * FROM orders
             WHERE base_asset_id = $1 AND quote_asset_id = $2 AND side = $3 AND status = 'open'
             ORDER BY price {}, created_at ASC, id ASC",
            price_order
        );

        let rows = sqlx::query(&sql)
            .bind(pair.base())
            .bind(pair.quote())
            .bind(side.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_order_row).collect()
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_order_row).collect()
    }

    async fn cancel_order(&self, user_id: UserId, id: OrderId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'cancelled'
             WHERE id = $1 AND user_id = $2 AND status = 'open'",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit_match(
        &self,
        buy_id: OrderId,
        sell_id: OrderId,
        quantity: Decimal,
        settlement: &LedgerBatch,
    ) -> Result<MatchOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock both orders in id order so concurrent matchers cannot
        // deadlock on them.
        let mut first_id = buy_id;
        let mut second_id = sell_id;
        if second_id < first_id {
            std::mem::swap(&mut first_id, &mut second_id);
        }
        let first = lock_order_tx(&mut tx, first_id).await?;
        let second = lock_order_tx(&mut tx, second_id).await?;
        let (mut buy, mut sell) = if first.id == buy_id { (first, second) } else { (second, first) };

        if !buy.is_open() || !sell.is_open() {
            return Err(StoreError::invalid_state("Both orders must be open to match"));
        }

        buy.fill(quantity).map_err(StoreError::Domain)?;
        sell.fill(quantity).map_err(StoreError::Domain)?;

        let transactions = apply_batch_tx(&mut tx, settlement).await?;

        update_order_tx(&mut tx, &buy).await?;
        update_order_tx(&mut tx, &sell).await?;

        tx.commit().await?;
        Ok(MatchOutcome { buy, sell, transactions })
    }
}

// =============================================================================
// Rate Repository Implementation
// =============================================================================

#[async_trait]
impl RateRepository for PgStore {
    async fn append_rate(&self, rate: &ExchangeRate) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO exchange_rates (base_asset_id, quote_asset_id, rate, source, as_of)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(rate.base_asset_id)
        .bind(rate.quote_asset_id)
        .bind(rate.rate)
        .bind(&rate.source)
        .bind(rate.as_of)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_rate(
        &self,
        base_asset_id: AssetId,
        quote_asset_id: AssetId,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM exchange_rates
             WHERE base_asset_id = $1 AND quote_asset_id = $2
             ORDER BY as_of DESC
             LIMIT 1",
        )
        .bind(base_asset_id)
        .bind(quote_asset_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_rate_row).transpose()
    }
}

// =============================================================================
// Staking Repository Implementation
// =============================================================================

#[async_trait]
impl StakingRepository for PgStore {
    async fn open_stake(
        &self,
        position: &StakingPosition,
        batch: &LedgerBatch,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let transactions = apply_batch_tx(&mut tx, batch).await?;

        sqlx::query(
            "INSERT INTO staking_positions (id, user_id, asset_id, amount, apy, locked_until, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(position.id)
        .bind(position.user_id)
        .bind(position.asset_id)
        .bind(position.amount)
        .bind(position.apy)
        .bind(position.locked_until)
        .bind(position.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transactions)
    }

    async fn close_stake(&self, id: StakeId, batch: &LedgerBatch) -> Result<Vec<Transaction>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query("SELECT id FROM staking_positions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::not_found("stake", id.to_string()));
        }

        let transactions = apply_batch_tx(&mut tx, batch).await?;

        sqlx::query("DELETE FROM staking_positions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(transactions)
    }

    async fn find_stake(&self, id: StakeId) -> Result<Option<StakingPosition>, StoreError> {
        let row = sqlx::query("SELECT * FROM staking_positions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_stake_row).transpose()
    }

    async fn stakes_for_user(&self, user_id: UserId) -> Result<Vec<StakingPosition>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM staking_positions WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_stake_row).collect()
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for PgStore {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Posting;
    use obol_domain::{Amount, Price, Rate};
    use rust_decimal_macros::dec;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn credit_batch(user: UserId, asset: AssetId, value: Decimal) -> LedgerBatch {
        LedgerBatch::new().with(Posting::new(user, asset, TransactionType::Deposit, amount(value)))
    }

    /// Run with: `cargo test -p obol-store --features postgres`
    #[sqlx::test(migrations = "../migrations")]
    async fn test_apply_batch_is_atomic(pool: PgPool) {
        let store = PgStore::new(pool);
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        let asset = Uuid::now_v7();

        store.ledger().apply(&credit_batch(alice, asset, dec!(100))).await.unwrap();
        assert_eq!(store.balance(alice, asset).await.unwrap(), dec!(100));

        // Transfer more than Alice has: both legs must be rolled back
        let transfer = LedgerBatch::new()
            .with(Posting::new(bob, asset, TransactionType::TransferIn, amount(dec!(500))))
            .with(Posting::new(alice, asset, TransactionType::TransferOut, amount(dec!(500))));

        let err = store.ledger().apply(&transfer).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientBalance { .. }));

        assert_eq!(store.balance(alice, asset).await.unwrap(), dec!(100));
        assert_eq!(store.balance(bob, asset).await.unwrap(), dec!(0));
        assert_eq!(store.total_for_asset(asset).await.unwrap(), dec!(100));

        // Only the deposit row made it into the log
        let rows = store.transactions().history(alice, &HistoryQuery::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tx_type, TransactionType::Deposit);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_deposit_workflow(pool: PgPool) {
        let store = PgStore::new(pool);
        let user = Uuid::now_v7();
        let asset = Uuid::now_v7();

        let deposit = Transaction::pending_deposit(user, asset, amount(dec!(50)), Some("0xabc".into()));
        store.ledger().submit_deposit(&deposit).await.unwrap();
        assert_eq!(store.balance(user, asset).await.unwrap(), dec!(0));

        // Resubmitting the same external reference returns the original row
        let resubmit = Transaction::pending_deposit(user, asset, amount(dec!(50)), Some("0xabc".into()));
        let deduped = store.ledger().submit_deposit(&resubmit).await.unwrap();
        assert_eq!(deduped.id, deposit.id);

        let confirmed = store.ledger().confirm_deposit(deposit.id).await.unwrap();
        assert_eq!(confirmed.status, TransactionStatus::Success);
        assert_eq!(store.balance(user, asset).await.unwrap(), dec!(50));

        // Second confirmation fails without a second credit
        assert!(matches!(
            store.ledger().confirm_deposit(deposit.id).await,
            Err(StoreError::InvalidState { .. })
        ));
        assert_eq!(store.balance(user, asset).await.unwrap(), dec!(50));

        // A new reference is accepted again once the first is confirmed
        let next = Transaction::pending_deposit(user, asset, amount(dec!(10)), Some("0xabc".into()));
        let stored = store.ledger().submit_deposit(&next).await.unwrap();
        assert_eq!(stored.id, next.id);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_history_sorted_by_trade_value(pool: PgPool) {
        let store = PgStore::new(pool);
        let user = Uuid::now_v7();
        let btc = Uuid::now_v7();
        let usd = Uuid::now_v7();

        store.ledger().apply(&credit_batch(user, btc, dec!(10))).await.unwrap();
        store
            .ledger()
            .apply(
                &LedgerBatch::new()
                    .with(
                        Posting::new(user, btc, TransactionType::TradeSell, amount(dec!(2)))
                            .with_trade_context(usd, dec!(50)),
                    )
                    .with(
                        Posting::new(user, btc, TransactionType::TradeBuy, amount(dec!(1)))
                            .with_trade_context(usd, dec!(300)),
                    ),
            )
            .await
            .unwrap();

        // Largest realized value first: +300, 0 (deposit), -100
        let by_value = store
            .transactions()
            .history(user, &HistoryQuery::new().by_trade_value())
            .await
            .unwrap();
        let values: Vec<Decimal> = by_value.iter().map(HistoryQuery::trade_value).collect();
        assert_eq!(values, vec![dec!(300), dec!(0), dec!(-100)]);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_commit_match_settles_both_sides(pool: PgPool) {
        let store = PgStore::new(pool);
        let base = Uuid::now_v7();
        let quote = Uuid::now_v7();
        let pair = AssetPair::new(base, quote).unwrap();
        let buyer = Uuid::now_v7();
        let seller = Uuid::now_v7();

        store.ledger().apply(&credit_batch(buyer, quote, dec!(1000))).await.unwrap();
        store.ledger().apply(&credit_batch(seller, base, dec!(3))).await.unwrap();

        let buy = Order::new(buyer, pair, OrderSide::Buy, amount(dec!(5)), Price::new(dec!(100)).unwrap());
        let sell = Order::new(seller, pair, OrderSide::Sell, amount(dec!(3)), Price::new(dec!(95)).unwrap());
        store.insert_order(&buy).await.unwrap();
        store.insert_order(&sell).await.unwrap();

        let settlement = LedgerBatch::new()
            .with(Posting::new(buyer, quote, TransactionType::TradeSell, amount(dec!(285)))
                .with_trade_context(base, dec!(95)))
            .with(Posting::new(buyer, base, TransactionType::TradeBuy, amount(dec!(3)))
                .with_trade_context(quote, dec!(95)))
            .with(Posting::new(seller, base, TransactionType::TradeSell, amount(dec!(3)))
                .with_trade_context(quote, dec!(95)))
            .with(Posting::new(seller, quote, TransactionType::TradeBuy, amount(dec!(285)))
                .with_trade_context(base, dec!(95)));

        let outcome = store.commit_match(buy.id, sell.id, dec!(3), &settlement).await.unwrap();
        assert_eq!(outcome.buy.amount, dec!(2));
        assert_eq!(outcome.buy.status, OrderStatus::Open);
        assert_eq!(outcome.sell.status, OrderStatus::Filled);

        assert_eq!(store.balance(buyer, base).await.unwrap(), dec!(3));
        assert_eq!(store.balance(buyer, quote).await.unwrap(), dec!(715));
        assert_eq!(store.balance(seller, quote).await.unwrap(), dec!(285));

        let stored_sell = store.find_order(sell.id).await.unwrap().unwrap();
        assert_eq!(stored_sell.amount, dec!(0));
        assert_eq!(stored_sell.status, OrderStatus::Filled);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_open_orders_price_time_priority(pool: PgPool) {
        let store = PgStore::new(pool);
        let pair = AssetPair::new(Uuid::now_v7(), Uuid::now_v7()).unwrap();
        let user = Uuid::now_v7();

        let cheap = Order::new(user, pair, OrderSide::Buy, amount(dec!(1)), Price::new(dec!(90)).unwrap());
        let first_best = Order::new(user, pair, OrderSide::Buy, amount(dec!(1)), Price::new(dec!(100)).unwrap());
        let second_best = Order::new(user, pair, OrderSide::Buy, amount(dec!(1)), Price::new(dec!(100)).unwrap());

        store.insert_order(&cheap).await.unwrap();
        store.insert_order(&first_best).await.unwrap();
        store.insert_order(&second_best).await.unwrap();

        let bids = store.open_orders(pair, OrderSide::Buy).await.unwrap();
        assert_eq!(bids.len(), 3);
        assert_eq!(bids[0].id, first_best.id);
        assert_eq!(bids[1].id, second_best.id);
        assert_eq!(bids[2].id, cheap.id);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_cancel_order_requires_open_and_owner(pool: PgPool) {
        let store = PgStore::new(pool);
        let pair = AssetPair::new(Uuid::now_v7(), Uuid::now_v7()).unwrap();
        let owner = Uuid::now_v7();

        let order = Order::new(owner, pair, OrderSide::Sell, amount(dec!(1)), Price::new(dec!(10)).unwrap());
        store.insert_order(&order).await.unwrap();

        assert!(!store.cancel_order(Uuid::now_v7(), order.id).await.unwrap());
        assert!(store.cancel_order(owner, order.id).await.unwrap());
        assert!(!store.cancel_order(owner, order.id).await.unwrap());

        let stored = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_latest_rate(pool: PgPool) {
        let store = PgStore::new(pool);
        let base = Uuid::now_v7();
        let quote = Uuid::now_v7();

        let mut old = ExchangeRate::snapshot(base, quote, Rate::new(dec!(1.5)).unwrap(), "seed");
        old.as_of = Utc::now() - chrono::Duration::hours(1);
        store.append_rate(&old).await.unwrap();

        let newer = ExchangeRate::snapshot(base, quote, Rate::new(dec!(2.0)).unwrap(), "seed");
        store.append_rate(&newer).await.unwrap();

        let latest = store.latest_rate(base, quote).await.unwrap().unwrap();
        assert_eq!(latest.rate, dec!(2.0));
        assert!(store.latest_rate(quote, base).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_stake_lifecycle(pool: PgPool) {
        let store = PgStore::new(pool);
        let user = Uuid::now_v7();
        let asset = Uuid::now_v7();

        store.ledger().apply(&credit_batch(user, asset, dec!(100))).await.unwrap();

        let position = StakingPosition::new(user, asset, amount(dec!(40)), dec!(0.05), None);
        let fund = LedgerBatch::new()
            .with(Posting::new(user, asset, TransactionType::Stake, amount(dec!(40))));
        store.open_stake(&position, &fund).await.unwrap();

        assert_eq!(store.balance(user, asset).await.unwrap(), dec!(60));
        assert_eq!(store.stakes_for_user(user).await.unwrap().len(), 1);

        let release = LedgerBatch::new()
            .with(Posting::new(user, asset, TransactionType::Unstake, amount(dec!(40))));
        store.close_stake(position.id, &release).await.unwrap();

        assert_eq!(store.balance(user, asset).await.unwrap(), dec!(100));
        assert!(store.find_stake(position.id).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_asset_registry(pool: PgPool) {
        let store = PgStore::new(pool);

        let btc = Asset::new("BTC", 8, AssetKind::Crypto).unwrap();
        store.insert_asset(&btc).await.unwrap();

        let found = store.find_asset_by_symbol("btc").await.unwrap().unwrap();
        assert_eq!(found.id, btc.id);

        store.deactivate_asset(btc.id).await.unwrap();
        assert!(store.find_asset_by_symbol("BTC").await.unwrap().is_none());
        assert!(store.find_asset(btc.id).await.unwrap().is_some());
    }
}
