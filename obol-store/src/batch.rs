//! Ledger batches: the explicit unit of work for balance mutations
//!
//! Every multi-step balance movement (trade legs, swap + fee, transfer,
//! stake) is described as a `LedgerBatch` of postings and handed to the
//! store, which applies all of it or none of it within one transactional
//! boundary. Callers never mutate holdings directly.

use obol_domain::{Amount, AssetId, Direction, Transaction, TransactionType, UserId};
use rust_decimal::Decimal;

/// One balance movement within a batch
///
/// The direction is implied by the transaction type, so a posting cannot
/// disagree with the log entry it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Affected user
    pub user_id: UserId,
    /// Affected asset
    pub asset_id: AssetId,
    /// Event type (implies credit or debit)
    pub tx_type: TransactionType,
    /// Moved amount
    pub amount: Amount,
    /// Counter asset for trade/swap legs
    pub quote_asset_id: Option<AssetId>,
    /// Execution price/rate for trade/swap legs
    pub price: Option<Decimal>,
}

impl Posting {
    /// Create a posting with no trade context
    pub fn new(user_id: UserId, asset_id: AssetId, tx_type: TransactionType, amount: Amount) -> Self {
        Self {
            user_id,
            asset_id,
            tx_type,
            amount,
            quote_asset_id: None,
            price: None,
        }
    }

    /// Attach trade context (counter asset and execution price)
    pub fn with_trade_context(mut self, quote_asset_id: AssetId, price: Decimal) -> Self {
        self.quote_asset_id = Some(quote_asset_id);
        self.price = Some(price);
        self
    }

    /// Direction this posting moves the holding
    pub fn direction(&self) -> Direction {
        self.tx_type.direction()
    }

    /// Signed delta applied to the holding balance
    pub fn signed_amount(&self) -> Decimal {
        self.amount.as_decimal() * self.direction().sign()
    }

    /// Materialize the SUCCESS transaction row this posting records
    pub fn to_transaction(&self) -> Transaction {
        let tx = Transaction::applied(self.user_id, self.asset_id, self.tx_type, self.amount);
        match (self.quote_asset_id, self.price) {
            (Some(quote), Some(price)) => tx.with_trade_context(quote, price),
            _ => tx,
        }
    }
}

/// An ordered set of postings applied atomically
///
/// Postings are validated in order against a working copy of the touched
/// balances, so a batch may debit an asset that an earlier posting credited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerBatch {
    postings: Vec<Posting>,
}

impl LedgerBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a posting (builder style)
    pub fn with(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }

    /// Append a posting
    pub fn push(&mut self, posting: Posting) {
        self.postings.push(posting);
    }

    /// The postings in application order
    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    /// Whether the batch contains no postings
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Number of postings
    pub fn len(&self) -> usize {
        self.postings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_posting_signed_amount() {
        let user = Uuid::now_v7();
        let asset = Uuid::now_v7();
        let amount = Amount::new(dec!(50)).unwrap();

        let credit = Posting::new(user, asset, TransactionType::Deposit, amount);
        assert_eq!(credit.signed_amount(), dec!(50));
        assert_eq!(credit.direction(), Direction::Credit);

        let debit = Posting::new(user, asset, TransactionType::Withdraw, amount);
        assert_eq!(debit.signed_amount(), dec!(-50));
        assert_eq!(debit.direction(), Direction::Debit);
    }

    #[test]
    fn test_posting_to_transaction_carries_context() {
        let user = Uuid::now_v7();
        let base = Uuid::now_v7();
        let quote = Uuid::now_v7();

        let posting = Posting::new(user, base, TransactionType::TradeBuy, Amount::new(dec!(3)).unwrap())
            .with_trade_context(quote, dec!(95));

        let tx = posting.to_transaction();
        assert_eq!(tx.user_id, user);
        assert_eq!(tx.asset_id, base);
        assert_eq!(tx.amount, dec!(3));
        assert_eq!(tx.quote_asset_id, Some(quote));
        assert_eq!(tx.price, Some(dec!(95)));
        assert_eq!(tx.status, obol_domain::TransactionStatus::Success);
    }

    #[test]
    fn test_batch_builder() {
        let user = Uuid::now_v7();
        let asset = Uuid::now_v7();

        let batch = LedgerBatch::new()
            .with(Posting::new(user, asset, TransactionType::Deposit, Amount::new(dec!(1)).unwrap()))
            .with(Posting::new(user, asset, TransactionType::Withdraw, Amount::new(dec!(1)).unwrap()));

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }
}
