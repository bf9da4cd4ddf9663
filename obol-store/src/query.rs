//! Transaction history queries

use chrono::{DateTime, Utc};
use obol_domain::{AssetId, Transaction, TransactionStatus, TransactionType};
use rust_decimal::Decimal;

/// Sort key for history reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistorySort {
    /// Order by creation time
    #[default]
    Time,
    /// Order by realized trade value: signed `amount * price`. Rows
    /// without an execution price (deposits, transfers, ...) count as
    /// zero, so trades sort around the non-trade entries.
    TradeValue,
}

/// Filter and pagination options for reading a user's transaction history
///
/// Defaults to newest-first with no filters.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    /// Filter by transaction type
    pub tx_type: Option<TransactionType>,

    /// Filter by status
    pub status: Option<TransactionStatus>,

    /// Filter by asset
    pub asset_id: Option<AssetId>,

    /// Start time (inclusive)
    pub from_time: Option<DateTime<Utc>>,

    /// End time (exclusive)
    pub to_time: Option<DateTime<Utc>>,

    /// Ascending (true) or descending (false) by the sort key
    pub ascending: bool,

    /// Sort key (creation time by default)
    pub sort: HistorySort,

    /// Limit results
    pub limit: Option<i64>,

    /// Skip this many results (pagination)
    pub offset: Option<i64>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryQuery {
    /// Create empty query options (newest first, everything)
    pub fn new() -> Self {
        Self {
            tx_type: None,
            status: None,
            asset_id: None,
            from_time: None,
            to_time: None,
            ascending: false,
            sort: HistorySort::Time,
            limit: None,
            offset: None,
        }
    }

    /// Filter by transaction type
    pub fn tx_type(mut self, tx_type: TransactionType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }

    /// Filter by status
    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by asset
    pub fn asset(mut self, asset_id: AssetId) -> Self {
        self.asset_id = Some(asset_id);
        self
    }

    /// Keep entries at or after this time
    pub fn from_time(mut self, from: DateTime<Utc>) -> Self {
        self.from_time = Some(from);
        self
    }

    /// Keep entries strictly before this time
    pub fn to_time(mut self, to: DateTime<Utc>) -> Self {
        self.to_time = Some(to);
        self
    }

    /// Sort oldest first
    pub fn oldest_first(mut self) -> Self {
        self.ascending = true;
        self
    }

    /// Sort by realized trade value instead of time
    pub fn by_trade_value(mut self) -> Self {
        self.sort = HistorySort::TradeValue;
        self
    }

    /// The trade-value sort key for one transaction
    ///
    /// Signed quote-asset value of a trade row (positive for credits,
    /// negative for debits); zero for rows without an execution price.
    pub fn trade_value(tx: &Transaction) -> Decimal {
        match tx.price {
            Some(price) => tx.signed_amount() * price,
            None => Decimal::ZERO,
        }
    }

    /// Limit the result count
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip results (pagination)
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether a transaction passes the filters (shared by the memory store)
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(tx_type) = self.tx_type {
            if tx.tx_type != tx_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if tx.status != status {
                return false;
            }
        }
        if let Some(asset_id) = self.asset_id {
            if tx.asset_id != asset_id {
                return false;
            }
        }
        if let Some(from) = self.from_time {
            if tx.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to_time {
            if tx.created_at >= to {
                return false;
            }
        }
        true
    }
}
