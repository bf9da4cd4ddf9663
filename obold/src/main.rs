//! Obol Daemon
//!
//! Operational binary: database lifecycle commands and the background
//! match loop over the order book.
//!
//! # Usage
//!
//! ```bash
//! # Database lifecycle (postgres feature)
//! obold db migrate
//! obold db status
//! obold db seed
//!
//! # Run the match loop against DATABASE_URL
//! obold
//! ```
//!
//! Without the `postgres` cargo feature the daemon runs on an in-memory
//! store, for local smoke runs only.
//!
//! # Environment Variables
//!
//! - `OBOL_ENV`: Environment (test, development, production)
//! - `DATABASE_URL`: PostgreSQL connection string
//! - `OBOL_FEE_RATE`: Swap fee rate (default: 0.01)
//! - `OBOL_MATCH_INTERVAL_MS`: Interval between match passes (default: 500)

mod config;
#[cfg(feature = "postgres")]
mod db;
mod error;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use obol_book::MatchEngine;
use obol_domain::AssetPair;
use obol_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("obold=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "db" {
        #[cfg(feature = "postgres")]
        return db::run_db_command(args).await;
        #[cfg(not(feature = "postgres"))]
        return Err(anyhow!("db commands require a build with the postgres feature"));
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        fee_rate = %config.ledger.fee_rate.as_decimal(),
        "Obol daemon"
    );

    run(config).await
}

#[cfg(feature = "postgres")]
async fn run(config: Config) -> anyhow::Result<()> {
    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow!("DATABASE_URL is required to run the daemon"))?;

    let pool = sqlx::PgPool::connect(&database_url).await?;
    let store = Arc::new(obol_store::PgStore::new(pool));
    let engine = MatchEngine::new(store.clone());

    run_match_loop(store, engine, config.ledger.match_interval_ms).await
}

#[cfg(not(feature = "postgres"))]
async fn run(config: Config) -> anyhow::Result<()> {
    tracing::warn!("Running on the in-memory store; balances are not persisted");

    let store = Arc::new(obol_store::MemoryStore::new());
    let engine = MatchEngine::new(store.clone());

    run_match_loop(store, engine, config.ledger.match_interval_ms).await
}

/// Periodically run a match pass over every tradeable pair.
///
/// Runs until Ctrl-C. Pairs are rebuilt from the active asset set each
/// round, so newly seeded or deactivated assets take effect without a
/// restart.
async fn run_match_loop<S: Store + 'static>(
    store: Arc<S>,
    engine: MatchEngine<S>,
    interval_ms: u64,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));

    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                return Ok(());
            },
        }

        let assets = store.assets().list_active_assets().await?;

        for base in &assets {
            for quote in &assets {
                if base.id == quote.id {
                    continue;
                }
                // base != quote guaranteed above
                let pair = AssetPair::new(base.id, quote.id)
                    .map_err(|e| anyhow!("Invalid pair: {}", e))?;

                let report = engine.match_pair(pair).await?;
                if !report.fills.is_empty() {
                    debug!(
                        base = %base.symbol,
                        quote = %quote.symbol,
                        fills = report.fills.len(),
                        "Match pass filled orders"
                    );
                }
            }
        }
    }
}
