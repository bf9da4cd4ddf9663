//! Test helper functions for store seeding.

use anyhow::Result;
use rust_decimal::Decimal;
use uuid::Uuid;

use obol_domain::{Amount, Asset, AssetKind, TransactionStatus, TransactionType, UserId};
use obol_store::{HistoryQuery, LedgerBatch, MemoryStore, Posting, Store};

/// The default asset set seeded into test stores.
pub struct SeededAssets {
    /// Bitcoin, 8 decimals
    pub btc: Asset,
    /// Ether, 18 decimals
    pub eth: Asset,
    /// US dollar, 2 decimals
    pub usd: Asset,
}

/// Seed a store with the default test assets.
pub async fn seed_default_assets<S: Store>(store: &S) -> Result<SeededAssets> {
    let btc = Asset::new("BTC", 8, AssetKind::Crypto)?;
    let eth = Asset::new("ETH", 18, AssetKind::Crypto)?;
    let usd = Asset::new("USD", 2, AssetKind::Fiat)?;

    store.assets().insert_asset(&btc).await?;
    store.assets().insert_asset(&eth).await?;
    store.assets().insert_asset(&usd).await?;

    Ok(SeededAssets { btc, eth, usd })
}

/// Create a fresh in-memory store with the default assets.
pub async fn seeded_store() -> Result<(MemoryStore, SeededAssets)> {
    let store = MemoryStore::new();
    let assets = seed_default_assets(&store).await?;
    Ok((store, assets))
}

/// Credit a user through a regular deposit posting.
///
/// Funds arrive the same way production funds do, so the transaction log
/// stays reconcilable in tests.
pub async fn fund_user<S: Store>(
    store: &S,
    user_id: UserId,
    asset_id: Uuid,
    amount: Decimal,
) -> Result<()> {
    let batch = LedgerBatch::new().with(Posting::new(
        user_id,
        asset_id,
        TransactionType::Deposit,
        Amount::new(amount)?,
    ));
    store.ledger().apply(&batch).await?;
    Ok(())
}

/// Assert that holdings and the transaction log agree for an asset.
///
/// Every balance change has a matching log row, so the sum of all
/// holdings for an asset must equal the signed sum of its SUCCESS rows
/// across the given users. Pending rows carry no balance effect and are
/// excluded.
pub async fn assert_conservation<S: Store>(
    store: &S,
    asset_id: Uuid,
    users: &[UserId],
) -> Result<()> {
    let held = store.holdings().total_for_asset(asset_id).await?;

    let mut signed_sum = Decimal::ZERO;
    for user in users {
        let rows = store
            .transactions()
            .history(*user, &HistoryQuery::new().asset(asset_id))
            .await?;
        for tx in rows {
            if tx.status == TransactionStatus::Success {
                signed_sum += tx.signed_amount();
            }
        }
    }

    anyhow::ensure!(
        held == signed_sum,
        "Conservation violated for asset {}: holdings {} != signed transaction sum {}",
        asset_id,
        held,
        signed_sum
    );
    Ok(())
}
