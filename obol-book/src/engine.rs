//! Price-time priority matching over resting limit orders.
//!
//! Orders rest in the store; each match pass pulls the best bid and the
//! best ask, settles `min(remaining)` at the RESTING SELL's price, and
//! commits the fill together with its settlement batch in one atomic
//! store operation. No funds are escrowed at placement: an order whose
//! owner cannot cover the settlement leg is force-cancelled at match
//! time, so every pass strictly reduces open volume and the loop
//! terminates.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use obol_domain::{Amount, AssetPair, Order, OrderId, OrderSide, Price, UserId};
use obol_exec::match_settlement;
use obol_store::{MatchOutcome, Store, StoreError};

use crate::error::{BookError, BookResult};

/// Upper bound on fills per match pass. A pass that hits it stops and
/// leaves the rest to the next invocation.
const MAX_FILLS_PER_PASS: usize = 10_000;

/// What one `match_pair` invocation did.
#[derive(Debug, Default)]
pub struct MatchReport {
    /// Fills committed, in execution order
    pub fills: Vec<MatchOutcome>,
    /// Orders force-cancelled because their owner could not settle
    pub cancelled: Vec<OrderId>,
}

/// Matching engine over a store-backed order book.
///
/// One engine instance serves all pairs; a per-pair async mutex keeps
/// match passes for the same pair from interleaving.
pub struct MatchEngine<S: Store> {
    store: Arc<S>,
    pair_locks: Mutex<HashMap<AssetPair, Arc<Mutex<()>>>>,
}

impl<S: Store> MatchEngine<S> {
    /// Create a new matching engine on top of the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn pair_lock(&self, pair: AssetPair) -> Arc<Mutex<()>> {
        let mut locks = self.pair_locks.lock().await;
        locks
            .entry(pair)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Place a limit order on the book.
    ///
    /// Validates that both legs of the pair are active registry assets
    /// and that amount and price are positive. The order rests OPEN
    /// until matched or cancelled; no funds are reserved.
    pub async fn place_order(
        &self,
        user_id: UserId,
        pair: AssetPair,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> BookResult<Order> {
        for asset_id in [pair.base(), pair.quote()] {
            let tradeable = self
                .store
                .assets()
                .find_asset(asset_id)
                .await?
                .map(|a| a.active)
                .unwrap_or(false);
            if !tradeable {
                return Err(BookError::AssetNotTradeable(asset_id));
            }
        }

        let order = Order::new(user_id, pair, side, Amount::new(amount)?, Price::new(price)?);
        self.store.orders().insert_order(&order).await?;

        info!(
            order_id = %order.id,
            %user_id,
            side = side.as_str(),
            amount = %order.amount,
            price = %order.price,
            "Order placed"
        );
        Ok(order)
    }

    /// Cancel an open order owned by `user_id`.
    ///
    /// Returns `true` if the order was open and is now cancelled,
    /// `false` for unknown, foreign, or already-terminal orders. The
    /// check-and-set is atomic in the store, so a cancel can never race
    /// a fill into cancelling a filled order.
    pub async fn cancel(&self, user_id: UserId, order_id: OrderId) -> BookResult<bool> {
        let cancelled = self.store.orders().cancel_order(user_id, order_id).await?;
        if cancelled {
            info!(%order_id, %user_id, "Order cancelled");
        }
        Ok(cancelled)
    }

    /// Run one match pass over a pair.
    ///
    /// Repeatedly takes the best bid (highest price, FIFO on ties) and
    /// the best ask (lowest price, FIFO on ties); stops as soon as the
    /// book is not crossed. Each fill is `min(remaining)` at the resting
    /// sell's price.
    pub async fn match_pair(&self, pair: AssetPair) -> BookResult<MatchReport> {
        let lock = self.pair_lock(pair).await;
        let _guard = lock.lock().await;

        let mut report = MatchReport::default();

        while report.fills.len() < MAX_FILLS_PER_PASS {
            let bids = self.store.orders().open_orders(pair, OrderSide::Buy).await?;
            let asks = self.store.orders().open_orders(pair, OrderSide::Sell).await?;

            let (Some(buy), Some(sell)) = (bids.first(), asks.first()) else {
                break;
            };

            if buy.price < sell.price {
                break;
            }

            let quantity = buy.amount.min(sell.amount);
            let price = sell.price;
            let settlement = match_settlement(buy, sell, quantity, price)?;

            match self
                .store
                .orders()
                .commit_match(buy.id, sell.id, quantity, &settlement)
                .await
            {
                Ok(outcome) => {
                    debug!(
                        buy_id = %outcome.buy.id,
                        sell_id = %outcome.sell.id,
                        %quantity,
                        %price,
                        "Match committed"
                    );
                    report.fills.push(outcome);
                },
                Err(StoreError::InsufficientBalance { user_id, .. }) => {
                    // The uncoverable order leaves the book so the rest
                    // of the queue can trade.
                    let doomed = if buy.user_id == user_id { buy } else { sell };
                    warn!(
                        order_id = %doomed.id,
                        %user_id,
                        "Force-cancelling order: owner cannot cover settlement"
                    );
                    self.store.orders().cancel_order(doomed.user_id, doomed.id).await?;
                    report.cancelled.push(doomed.id);
                },
                // A concurrent cancel closed one of the orders between
                // the read and the commit; re-read the book.
                Err(StoreError::InvalidState { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if report.fills.len() >= MAX_FILLS_PER_PASS {
            warn!(fills = report.fills.len(), "Match pass hit fill cap, leaving remainder for next pass");
        }

        if !report.fills.is_empty() || !report.cancelled.is_empty() {
            info!(
                fills = report.fills.len(),
                cancelled = report.cancelled.len(),
                "Match pass complete"
            );
        }
        Ok(report)
    }
}
