//! Asset registry seeding for Obol.
//!
//! Seeds the default asset set so a fresh deployment can trade.

use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use super::Result;

/// Default assets: (symbol, decimals, kind).
const DEFAULT_ASSETS: &[(&str, i32, &str)] = &[
    ("BTC", 8, "crypto"),
    ("ETH", 18, "crypto"),
    ("SOL", 9, "crypto"),
    ("USDT", 6, "crypto"),
    ("USD", 2, "fiat"),
    ("EUR", 2, "fiat"),
];

/// Seed the asset registry with the default asset set.
///
/// Symbols that already exist are left untouched.
/// Uses INSERT ... ON CONFLICT DO NOTHING for idempotency.
pub async fn seed_assets(pool: &PgPool) -> Result<Vec<(String, Uuid)>> {
    let mut tx = pool.begin().await?;
    let mut seeded = Vec::new();

    for (symbol, decimals, kind) in DEFAULT_ASSETS {
        let id = Uuid::now_v7();

        let result = sqlx::query(
            r#"
            INSERT INTO assets (id, symbol, decimals, kind, active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (symbol) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(symbol)
        .bind(decimals)
        .bind(kind)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            info!("Seeded asset {} ({})", symbol, id);
            seeded.push((symbol.to_string(), id));
        } else {
            let row = sqlx::query("SELECT id FROM assets WHERE symbol = $1")
                .bind(symbol)
                .fetch_one(&mut *tx)
                .await?;
            let existing: Uuid = row.get("id");
            info!("Asset {} already present ({})", symbol, existing);
            seeded.push((symbol.to_string(), existing));
        }
    }

    tx.commit().await?;
    Ok(seeded)
}
