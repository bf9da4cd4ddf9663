//! Database CLI subcommands for obold.
//!
//! Provides `db migrate`, `db status`, and `db seed` commands.

use anyhow::{anyhow, Result};
use std::env;
use tracing::info;

use obol_db::{migrate, seed_assets, status};

/// Run database CLI subcommands.
///
/// Supported commands:
/// - `obold db migrate` - Run pending migrations
/// - `obold db status` - Check migration status
/// - `obold db seed` - Seed the default asset registry
pub async fn run_db_command(args: Vec<String>) -> Result<()> {
    if args.len() < 3 {
        return Err(anyhow!("Usage: obold db <migrate|status|seed>"));
    }

    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow!("DATABASE_URL environment variable is required for db commands"))?;

    let pool = sqlx::PgPool::connect(&database_url).await?;

    match args[2].as_str() {
        "migrate" => {
            migrate(&pool).await?;
        },
        "status" => {
            status(&pool).await?;
        },
        "seed" => {
            let seeded = seed_assets(&pool).await?;
            for (symbol, id) in seeded {
                info!("Asset {}: {}", symbol, id);
            }
        },
        _ => {
            return Err(anyhow!("Unknown db command: {}. Use migrate, status, or seed", args[2]));
        },
    }

    Ok(())
}
