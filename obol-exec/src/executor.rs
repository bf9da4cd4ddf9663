//! Executor: orchestrates account operations into atomic ledger batches.
//!
//! The Executor is the bridge between callers speaking in symbols and
//! amounts and the store speaking in validated postings. Every operation
//! resolves its inputs, captures any needed rate from the oracle, builds
//! one [`LedgerBatch`], and hands it to the store in a single atomic step.
//!
//! # Flow
//!
//! ```text
//! Request → resolve assets → capture rate → build batch → Store (atomic)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use obol_domain::{
    Amount, Asset, FeeRate, Order, OrderSide, StakeId, StakingPosition, Transaction, TransactionId,
    TransactionType, UserId,
};
use obol_store::{LedgerBatch, Posting, StoreError, Store};

use crate::error::{ExecError, ExecResult};
use crate::ports::{PriceOracle, RateQuote};

// =============================================================================
// Swap Preview
// =============================================================================

/// The arithmetic of a swap before it is committed.
///
/// `net_to_amount = (from_amount - fee_amount) * rate`
#[derive(Debug, Clone)]
pub struct SwapPreview {
    /// Asset being sold
    pub from_asset: Asset,
    /// Asset being bought
    pub to_asset: Asset,
    /// Gross amount of `from_asset` the user spends
    pub from_amount: Decimal,
    /// Fee taken in `from_asset`
    pub fee_amount: Decimal,
    /// Rate used (to-units per from-unit)
    pub rate: Decimal,
    /// Where the rate came from and when
    pub rate_source: String,
    /// Amount of `to_asset` credited after the fee
    pub net_to_amount: Decimal,
}

/// A committed swap: the preview that was executed plus its ledger rows.
#[derive(Debug)]
pub struct SwapOutcome {
    /// The arithmetic that was committed
    pub preview: SwapPreview,
    /// Ledger rows written (fee debit, from debit, to credit)
    pub transactions: Vec<Transaction>,
}

// =============================================================================
// Executor
// =============================================================================

/// Executes account operations as atomic ledger batches.
///
/// The Executor:
/// 1. Resolves symbols against the asset registry (active assets only)
/// 2. Captures rates BEFORE any balance mutation
/// 3. Builds one batch per operation and applies it atomically
/// 4. Surfaces store rejections (insufficient balances, invalid states)
pub struct Executor<S: Store, P: PriceOracle> {
    /// Store for holdings, the transaction log, orders, and stakes
    store: Arc<S>,
    /// Rate source for trades and swaps
    oracle: Arc<P>,
    /// Swap fee rate, taken in the from-asset
    fee_rate: FeeRate,
}

impl<S: Store, P: PriceOracle> Executor<S, P> {
    /// Create a new executor.
    pub fn new(store: Arc<S>, oracle: Arc<P>, fee_rate: FeeRate) -> Self {
        Self { store, oracle, fee_rate }
    }

    /// Get the configured swap fee rate.
    pub fn fee_rate(&self) -> FeeRate {
        self.fee_rate
    }

    /// Resolve a symbol to an active asset.
    async fn resolve_asset(&self, symbol: &str) -> ExecResult<Asset> {
        self.store
            .assets()
            .find_asset_by_symbol(symbol)
            .await?
            .ok_or_else(|| ExecError::AssetNotFound { symbol: symbol.to_string() })
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Record a deposit claim as a PENDING transaction.
    ///
    /// No balance is touched until the deposit is confirmed. Resubmitting
    /// the same `external_reference` while the claim is still pending
    /// returns the existing transaction.
    pub async fn submit_deposit(
        &self,
        user_id: UserId,
        symbol: &str,
        amount: Decimal,
        external_reference: Option<String>,
    ) -> ExecResult<Transaction> {
        let asset = self.resolve_asset(symbol).await?;
        let amount = Amount::new(amount)?;

        let deposit = Transaction::pending_deposit(user_id, asset.id, amount, external_reference);
        let stored = self.store.ledger().submit_deposit(&deposit).await?;

        info!(%user_id, symbol, tx_id = %stored.id, "Deposit submitted");
        Ok(stored)
    }

    /// Confirm a pending deposit, crediting the holding exactly once.
    pub async fn confirm_deposit(&self, tx_id: TransactionId) -> ExecResult<Transaction> {
        let confirmed = self.store.ledger().confirm_deposit(tx_id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => ExecError::DepositNotFound(tx_id),
            StoreError::InvalidState { message } => ExecError::InvalidState(message),
            other => ExecError::Store(other),
        })?;

        info!(tx_id = %confirmed.id, user_id = %confirmed.user_id, "Deposit confirmed");
        Ok(confirmed)
    }

    // =========================================================================
    // Withdrawals and transfers
    // =========================================================================

    /// Withdraw from a holding. Fails on shortfall with no partial effect.
    pub async fn withdraw(&self, user_id: UserId, symbol: &str, amount: Decimal) -> ExecResult<Transaction> {
        let asset = self.resolve_asset(symbol).await?;
        let amount = Amount::new(amount)?;

        let batch = LedgerBatch::new()
            .with(Posting::new(user_id, asset.id, TransactionType::Withdraw, amount));
        let mut committed = self.store.ledger().apply(&batch).await?;

        info!(%user_id, symbol, "Withdrawal applied");
        Ok(committed.remove(0))
    }

    /// Move funds between two users atomically.
    pub async fn transfer(
        &self,
        from_user: UserId,
        to_user: UserId,
        symbol: &str,
        amount: Decimal,
    ) -> ExecResult<Vec<Transaction>> {
        if from_user == to_user {
            return Err(ExecError::InvalidState("Cannot transfer to the same user".to_string()));
        }

        let asset = self.resolve_asset(symbol).await?;
        let amount = Amount::new(amount)?;

        let batch = LedgerBatch::new()
            .with(Posting::new(from_user, asset.id, TransactionType::TransferOut, amount))
            .with(Posting::new(to_user, asset.id, TransactionType::TransferIn, amount));
        let committed = self.store.ledger().apply(&batch).await?;

        info!(%from_user, %to_user, symbol, "Transfer applied");
        Ok(committed)
    }

    // =========================================================================
    // Market orders and swaps
    // =========================================================================

    /// Execute a market order for `amount` of the base asset at the
    /// oracle rate.
    ///
    /// Buy spends `amount * rate` of quote for `amount` of base; sell is
    /// the mirror. Both legs commit in one batch.
    pub async fn execute_market_order(
        &self,
        user_id: UserId,
        base_symbol: &str,
        quote_symbol: &str,
        amount: Decimal,
        side: OrderSide,
    ) -> ExecResult<Vec<Transaction>> {
        let base = self.resolve_asset(base_symbol).await?;
        let quote = self.resolve_asset(quote_symbol).await?;
        let amount = Amount::new(amount)?;

        // Rate first: an unavailable rate must leave the ledger untouched
        let rate_quote = self.oracle.rate(base.id, quote.id).await?;
        let quote_amount = Amount::new(amount.as_decimal() * rate_quote.rate)?;

        debug!(
            %user_id,
            base = base_symbol,
            quote = quote_symbol,
            rate = %rate_quote.rate,
            side = side.as_str(),
            "Executing market order"
        );

        let batch = match side {
            OrderSide::Buy => LedgerBatch::new()
                .with(
                    Posting::new(user_id, quote.id, TransactionType::TradeSell, quote_amount)
                        .with_trade_context(base.id, rate_quote.rate),
                )
                .with(
                    Posting::new(user_id, base.id, TransactionType::TradeBuy, amount)
                        .with_trade_context(quote.id, rate_quote.rate),
                ),
            OrderSide::Sell => LedgerBatch::new()
                .with(
                    Posting::new(user_id, base.id, TransactionType::TradeSell, amount)
                        .with_trade_context(quote.id, rate_quote.rate),
                )
                .with(
                    Posting::new(user_id, quote.id, TransactionType::TradeBuy, quote_amount)
                        .with_trade_context(base.id, rate_quote.rate),
                ),
        };

        let committed = self.store.ledger().apply(&batch).await?;
        info!(%user_id, base = base_symbol, quote = quote_symbol, side = side.as_str(), "Market order executed");
        Ok(committed)
    }

    /// Compute a swap without committing anything.
    pub async fn preview_swap(
        &self,
        from_symbol: &str,
        to_symbol: &str,
        from_amount: Decimal,
    ) -> ExecResult<SwapPreview> {
        let from_asset = self.resolve_asset(from_symbol).await?;
        let to_asset = self.resolve_asset(to_symbol).await?;
        let from_amount = Amount::new(from_amount)?.as_decimal();

        let rate_quote = self.oracle.rate(from_asset.id, to_asset.id).await?;
        Ok(self.build_preview(from_asset, to_asset, from_amount, &rate_quote))
    }

    fn build_preview(
        &self,
        from_asset: Asset,
        to_asset: Asset,
        from_amount: Decimal,
        rate_quote: &RateQuote,
    ) -> SwapPreview {
        let fee_amount = self.fee_rate.apply_to(from_amount);
        let net_to_amount = (from_amount - fee_amount) * rate_quote.rate;

        SwapPreview {
            from_asset,
            to_asset,
            from_amount,
            fee_amount,
            rate: rate_quote.rate,
            rate_source: rate_quote.source.clone(),
            net_to_amount,
        }
    }

    /// Swap one asset for another at the oracle rate, taking the fee in
    /// the from-asset.
    ///
    /// Debits `from_amount` in total (fee row plus trade row) and credits
    /// `net_to_amount`, all in one batch.
    pub async fn execute_swap(
        &self,
        user_id: UserId,
        from_symbol: &str,
        to_symbol: &str,
        from_amount: Decimal,
    ) -> ExecResult<SwapOutcome> {
        let from_asset = self.resolve_asset(from_symbol).await?;
        let to_asset = self.resolve_asset(to_symbol).await?;
        let from_amount = Amount::new(from_amount)?.as_decimal();

        // Rate first: an unavailable rate must leave the ledger untouched
        let rate_quote = self.oracle.rate(from_asset.id, to_asset.id).await?;
        let preview = self.build_preview(from_asset, to_asset, from_amount, &rate_quote);

        let trade_amount = Amount::new(preview.from_amount - preview.fee_amount)?;
        let credit_amount = Amount::new(preview.net_to_amount)?;

        let mut batch = LedgerBatch::new();
        if preview.fee_amount > Decimal::ZERO {
            batch.push(Posting::new(
                user_id,
                preview.from_asset.id,
                TransactionType::Fee,
                Amount::new(preview.fee_amount)?,
            ));
        }
        batch.push(
            Posting::new(user_id, preview.from_asset.id, TransactionType::TradeSell, trade_amount)
                .with_trade_context(preview.to_asset.id, preview.rate),
        );
        batch.push(
            Posting::new(user_id, preview.to_asset.id, TransactionType::TradeBuy, credit_amount)
                .with_trade_context(preview.from_asset.id, preview.rate),
        );

        let transactions = self.store.ledger().apply(&batch).await?;

        info!(
            %user_id,
            from = from_symbol,
            to = to_symbol,
            rate = %preview.rate,
            fee = %preview.fee_amount,
            "Swap executed"
        );

        Ok(SwapOutcome { preview, transactions })
    }

    // =========================================================================
    // Staking
    // =========================================================================

    /// Lock funds into a staking position.
    pub async fn stake(
        &self,
        user_id: UserId,
        symbol: &str,
        amount: Decimal,
        apy: Decimal,
        locked_until: Option<DateTime<Utc>>,
    ) -> ExecResult<StakingPosition> {
        let asset = self.resolve_asset(symbol).await?;
        let amount = Amount::new(amount)?;

        let position = StakingPosition::new(user_id, asset.id, amount, apy, locked_until);
        let batch = LedgerBatch::new()
            .with(Posting::new(user_id, asset.id, TransactionType::Stake, amount));

        self.store.staking().open_stake(&position, &batch).await?;

        info!(%user_id, symbol, stake_id = %position.id, "Stake opened");
        Ok(position)
    }

    /// Release a staking position back to the holding.
    ///
    /// Fails with `PositionLocked` before `locked_until` has passed.
    pub async fn unstake(&self, user_id: UserId, stake_id: StakeId) -> ExecResult<Vec<Transaction>> {
        let position = self
            .store
            .staking()
            .find_stake(stake_id)
            .await?
            .ok_or(ExecError::StakeNotFound(stake_id))?;

        if position.user_id != user_id {
            return Err(ExecError::StakeNotFound(stake_id));
        }

        let now = Utc::now();
        if position.is_locked(now) {
            return Err(ExecError::PositionLocked {
                stake_id,
                // is_locked is only true with a lock present
                locked_until: position.locked_until.unwrap_or(now),
            });
        }

        let amount = Amount::new(position.amount)?;
        let batch = LedgerBatch::new()
            .with(Posting::new(user_id, position.asset_id, TransactionType::Unstake, amount));
        let transactions = self.store.staking().close_stake(stake_id, &batch).await?;

        info!(%user_id, %stake_id, "Stake closed");
        Ok(transactions)
    }
}

// =============================================================================
// Match settlement
// =============================================================================

/// Build the settlement batch for a match of `quantity` at `price`.
///
/// Four postings: the buyer pays `quantity * price` of quote for
/// `quantity` of base, the seller the mirror. Exact debits equal exact
/// credits per asset, so matching conserves every total.
pub fn match_settlement(buy: &Order, sell: &Order, quantity: Decimal, price: Decimal) -> ExecResult<LedgerBatch> {
    let base = buy.pair.base();
    let quote = buy.pair.quote();
    let base_amount = Amount::new(quantity)?;
    let quote_amount = Amount::new(quantity * price)?;

    Ok(LedgerBatch::new()
        .with(
            Posting::new(buy.user_id, quote, TransactionType::TradeSell, quote_amount)
                .with_trade_context(base, price),
        )
        .with(
            Posting::new(buy.user_id, base, TransactionType::TradeBuy, base_amount)
                .with_trade_context(quote, price),
        )
        .with(
            Posting::new(sell.user_id, base, TransactionType::TradeSell, base_amount)
                .with_trade_context(quote, price),
        )
        .with(
            Posting::new(sell.user_id, quote, TransactionType::TradeBuy, quote_amount)
                .with_trade_context(base, price),
        ))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubOracle;
    use obol_domain::{AssetKind, TransactionStatus};
    use obol_store::{HistoryQuery, MemoryStore};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        oracle: Arc<StubOracle>,
        executor: Executor<MemoryStore, StubOracle>,
        btc: Asset,
        usd: Asset,
    }

    async fn fixture(fee_rate: Decimal) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let oracle = Arc::new(StubOracle::new());

        let btc = Asset::new("BTC", 8, AssetKind::Crypto).unwrap();
        let usd = Asset::new("USD", 2, AssetKind::Fiat).unwrap();
        store.assets().insert_asset(&btc).await.unwrap();
        store.assets().insert_asset(&usd).await.unwrap();

        let executor = Executor::new(
            store.clone(),
            oracle.clone(),
            FeeRate::new(fee_rate).unwrap(),
        );

        Fixture { store, oracle, executor, btc, usd }
    }

    async fn fund(fx: &Fixture, user: UserId, symbol: &str, amount: Decimal) {
        let deposit = fx
            .executor
            .submit_deposit(user, symbol, amount, None)
            .await
            .unwrap();
        fx.executor.confirm_deposit(deposit.id).await.unwrap();
    }

    // Deposit tests
    #[tokio::test]
    async fn test_pending_deposit_is_not_spendable() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();

        let deposit = fx.executor.submit_deposit(user, "BTC", dec!(1), None).await.unwrap();
        assert_eq!(deposit.status, TransactionStatus::Pending);
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(0));

        // Spending against a pending deposit fails
        assert!(matches!(
            fx.executor.withdraw(user, "BTC", dec!(1)).await,
            Err(ExecError::Store(StoreError::InsufficientBalance { .. }))
        ));

        fx.executor.confirm_deposit(deposit.id).await.unwrap();
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(1));
    }

    #[tokio::test]
    async fn test_confirm_deposit_error_taxonomy() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();

        assert!(matches!(
            fx.executor.confirm_deposit(Uuid::now_v7()).await,
            Err(ExecError::DepositNotFound(_))
        ));

        let deposit = fx.executor.submit_deposit(user, "BTC", dec!(1), None).await.unwrap();
        fx.executor.confirm_deposit(deposit.id).await.unwrap();
        assert!(matches!(
            fx.executor.confirm_deposit(deposit.id).await,
            Err(ExecError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let fx = fixture(dec!(0.01)).await;
        assert!(matches!(
            fx.executor.submit_deposit(Uuid::now_v7(), "DOGE", dec!(1), None).await,
            Err(ExecError::AssetNotFound { .. })
        ));
    }

    // Withdraw and transfer tests
    #[tokio::test]
    async fn test_withdraw_and_shortfall() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "USD", dec!(100)).await;

        let tx = fx.executor.withdraw(user, "USD", dec!(30)).await.unwrap();
        assert_eq!(tx.tx_type, TransactionType::Withdraw);
        assert_eq!(fx.store.holdings().balance(user, fx.usd.id).await.unwrap(), dec!(70));

        assert!(fx.executor.withdraw(user, "USD", dec!(71)).await.is_err());
        assert_eq!(fx.store.holdings().balance(user, fx.usd.id).await.unwrap(), dec!(70));
    }

    #[tokio::test]
    async fn test_transfer_moves_funds_atomically() {
        let fx = fixture(dec!(0.01)).await;
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        fund(&fx, alice, "USD", dec!(100)).await;

        let txs = fx.executor.transfer(alice, bob, "USD", dec!(40)).await.unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(fx.store.holdings().balance(alice, fx.usd.id).await.unwrap(), dec!(60));
        assert_eq!(fx.store.holdings().balance(bob, fx.usd.id).await.unwrap(), dec!(40));

        // Self-transfer is rejected
        assert!(matches!(
            fx.executor.transfer(alice, alice, "USD", dec!(1)).await,
            Err(ExecError::InvalidState(_))
        ));
    }

    // Market order tests
    #[tokio::test]
    async fn test_market_order_buy_and_sell() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "USD", dec!(100000)).await;

        fx.oracle.set_rate(fx.btc.id, fx.usd.id, dec!(40000));

        let txs = fx
            .executor
            .execute_market_order(user, "BTC", "USD", dec!(2), OrderSide::Buy)
            .await
            .unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(2));
        assert_eq!(fx.store.holdings().balance(user, fx.usd.id).await.unwrap(), dec!(20000));

        fx.executor
            .execute_market_order(user, "BTC", "USD", dec!(1), OrderSide::Sell)
            .await
            .unwrap();
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(1));
        assert_eq!(fx.store.holdings().balance(user, fx.usd.id).await.unwrap(), dec!(60000));
    }

    #[tokio::test]
    async fn test_market_order_without_rate_leaves_ledger_untouched() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "USD", dec!(1000)).await;

        assert!(matches!(
            fx.executor
                .execute_market_order(user, "BTC", "USD", dec!(1), OrderSide::Buy)
                .await,
            Err(ExecError::RateUnavailable { .. })
        ));
        assert_eq!(fx.store.holdings().balance(user, fx.usd.id).await.unwrap(), dec!(1000));
        // Only the funding deposit is in the log
        let rows = fx.store.transactions().history(user, &HistoryQuery::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    // Swap tests
    #[tokio::test]
    async fn test_swap_fee_arithmetic() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "USD", dec!(100)).await;

        fx.oracle.set_rate(fx.usd.id, fx.btc.id, dec!(2.0));

        let outcome = fx.executor.execute_swap(user, "USD", "BTC", dec!(100)).await.unwrap();
        assert_eq!(outcome.preview.fee_amount, dec!(1.00));
        assert_eq!(outcome.preview.net_to_amount, dec!(198.00));
        assert_eq!(outcome.transactions.len(), 3);

        // Gross debit equals the full from amount
        assert_eq!(fx.store.holdings().balance(user, fx.usd.id).await.unwrap(), dec!(0));
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(198.00));

        // The fee is its own ledger row
        let fees = fx
            .store
            .transactions()
            .history(user, &HistoryQuery::new().tx_type(TransactionType::Fee))
            .await
            .unwrap();
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].amount, dec!(1.00));
    }

    #[tokio::test]
    async fn test_swap_with_zero_fee_rate() {
        let fx = fixture(dec!(0)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "USD", dec!(50)).await;

        fx.oracle.set_rate(fx.usd.id, fx.btc.id, dec!(2.0));

        let outcome = fx.executor.execute_swap(user, "USD", "BTC", dec!(50)).await.unwrap();
        assert_eq!(outcome.preview.fee_amount, dec!(0));
        assert_eq!(outcome.preview.net_to_amount, dec!(100.0));
        // No fee row when the fee is zero
        assert_eq!(outcome.transactions.len(), 2);
    }

    #[tokio::test]
    async fn test_preview_swap_is_pure() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "USD", dec!(100)).await;

        fx.oracle.set_rate(fx.usd.id, fx.btc.id, dec!(2.0));

        let preview = fx.executor.preview_swap("USD", "BTC", dec!(100)).await.unwrap();
        assert_eq!(preview.fee_amount, dec!(1.00));
        assert_eq!(preview.net_to_amount, dec!(198.00));

        assert_eq!(fx.store.holdings().balance(user, fx.usd.id).await.unwrap(), dec!(100));
        assert_eq!(fx.store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_swap_oracle_failure_before_any_mutation() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "USD", dec!(100)).await;

        fx.oracle.set_failing(true);
        assert!(matches!(
            fx.executor.execute_swap(user, "USD", "BTC", dec!(100)).await,
            Err(ExecError::RateUnavailable { .. })
        ));
        assert_eq!(fx.store.holdings().balance(user, fx.usd.id).await.unwrap(), dec!(100));
        assert_eq!(fx.store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_swap_insufficient_funds() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "USD", dec!(50)).await;

        fx.oracle.set_rate(fx.usd.id, fx.btc.id, dec!(2.0));

        assert!(fx.executor.execute_swap(user, "USD", "BTC", dec!(100)).await.is_err());
        assert_eq!(fx.store.holdings().balance(user, fx.usd.id).await.unwrap(), dec!(50));
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(0));
    }

    // Staking tests
    #[tokio::test]
    async fn test_stake_and_unstake_roundtrip() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "BTC", dec!(10)).await;

        let position = fx.executor.stake(user, "BTC", dec!(4), dec!(0.05), None).await.unwrap();
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(6));

        fx.executor.unstake(user, position.id).await.unwrap();
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(10));
        assert!(fx.store.staking().find_stake(position.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unstake_locked_position_fails() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "BTC", dec!(10)).await;

        let locked_until = Utc::now() + chrono::Duration::days(30);
        let position = fx
            .executor
            .stake(user, "BTC", dec!(4), dec!(0.05), Some(locked_until))
            .await
            .unwrap();

        assert!(matches!(
            fx.executor.unstake(user, position.id).await,
            Err(ExecError::PositionLocked { .. })
        ));
        // Funds stay in the position
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(6));
        assert!(fx.store.staking().find_stake(position.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unstake_expired_lock_succeeds() {
        let fx = fixture(dec!(0.01)).await;
        let user = Uuid::now_v7();
        fund(&fx, user, "BTC", dec!(10)).await;

        let locked_until = Utc::now() - chrono::Duration::days(1);
        let position = fx
            .executor
            .stake(user, "BTC", dec!(4), dec!(0.05), Some(locked_until))
            .await
            .unwrap();

        fx.executor.unstake(user, position.id).await.unwrap();
        assert_eq!(fx.store.holdings().balance(user, fx.btc.id).await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn test_unstake_foreign_position_is_not_found() {
        let fx = fixture(dec!(0.01)).await;
        let owner = Uuid::now_v7();
        let stranger = Uuid::now_v7();
        fund(&fx, owner, "BTC", dec!(10)).await;

        let position = fx.executor.stake(owner, "BTC", dec!(4), dec!(0.05), None).await.unwrap();

        assert!(matches!(
            fx.executor.unstake(stranger, position.id).await,
            Err(ExecError::StakeNotFound(_))
        ));
    }

    // Settlement builder tests
    #[tokio::test]
    async fn test_match_settlement_conserves_per_asset() {
        let base = Uuid::now_v7();
        let quote = Uuid::now_v7();
        let pair = obol_domain::AssetPair::new(base, quote).unwrap();

        let buy = Order::new(
            Uuid::now_v7(),
            pair,
            OrderSide::Buy,
            Amount::new(dec!(5)).unwrap(),
            obol_domain::Price::new(dec!(100)).unwrap(),
        );
        let sell = Order::new(
            Uuid::now_v7(),
            pair,
            OrderSide::Sell,
            Amount::new(dec!(3)).unwrap(),
            obol_domain::Price::new(dec!(95)).unwrap(),
        );

        let batch = match_settlement(&buy, &sell, dec!(3), dec!(95)).unwrap();
        assert_eq!(batch.len(), 4);

        let base_sum: Decimal = batch
            .postings()
            .iter()
            .filter(|p| p.asset_id == base)
            .map(|p| p.signed_amount())
            .sum();
        let quote_sum: Decimal = batch
            .postings()
            .iter()
            .filter(|p| p.asset_id == quote)
            .map(|p| p.signed_amount())
            .sum();
        assert_eq!(base_sum, dec!(0));
        assert_eq!(quote_sum, dec!(0));
    }
}
