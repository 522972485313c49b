use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Config, ExchangeConnector, TradingMode};
use engine::{KucoinConnector, Supervisor};
use paper::{PaperConnector, PaperExchange};
use store::Store;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.trading_mode, "BTS bot (buy-then-sell) starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let db = SqlitePool::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to database: {e}"));
    store::MIGRATOR
        .run(&db)
        .await
        .unwrap_or_else(|e| panic!("Database migration failed: {e}"));
    info!("Database ready");
    let store = Store::new(db);

    // ── Exchange connector (injected based on TRADING_MODE) ───────────────────
    let connector: Arc<dyn ExchangeConnector> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode — using KuCoin");
            Arc::new(KucoinConnector::new())
        }
        TradingMode::Paper => {
            info!(
                fill_price = cfg.paper_fill_price,
                fill_checks = cfg.paper_fill_checks,
                "Paper trading mode — using PaperExchange"
            );
            Arc::new(PaperConnector::new(Arc::new(PaperExchange::new(
                cfg.paper_fill_price,
                cfg.paper_fill_checks,
            ))))
        }
    };

    // ── Workers ───────────────────────────────────────────────────────────────
    Supervisor::new(store, connector)
        .start()
        .await
        .unwrap_or_else(|e| panic!("Failed to start workers: {e}"));

    // Keep main alive
    info!("All workers started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.unwrap();
    info!("Shutdown signal received. Exiting.");
}
