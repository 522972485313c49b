//! Periodic reconciliation of stale order records against the exchange.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use common::{ExchangeClient, ExchangeConnector, Result};
use store::Store;

use crate::settle;

/// Time between reconciliation passes.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
/// Retry delay after a failed pass.
pub const SWEEP_RETRY: Duration = Duration::from_secs(60);
/// How many unresolved orders per symbol a pass checks, oldest first.
pub const STALE_ORDER_LIMIT: i64 = 5;

/// Re-derives the true status of recently-open orders from the
/// exchange and repairs the local records. This is the sole recovery
/// path for orders abandoned by a timed-out waiter or a worker that
/// died mid-cycle. Runs concurrently with the cycle workers without
/// locks; only status/price/size/timestamp fields are rewritten.
pub struct Sweeper {
    store: Store,
    connector: Arc<dyn ExchangeConnector>,
}

impl Sweeper {
    pub fn new(store: Store, connector: Arc<dyn ExchangeConnector>) -> Self {
        Self { store, connector }
    }

    /// Run the sweeper loop. Call from `tokio::spawn`. A failed pass is
    /// retried as a whole after a short backoff — per-symbol retry
    /// granularity is not worth the complexity for an hourly job.
    pub async fn run(self) {
        info!("Reconciliation sweeper started");
        loop {
            match self.sweep_once().await {
                Ok(checked) => {
                    info!(checked, "Reconciliation pass complete, next in 1h");
                    sleep(SWEEP_INTERVAL).await;
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation pass failed");
                    sleep(SWEEP_RETRY).await;
                }
            }
        }
    }

    /// One pass over every active pair. Returns how many orders were
    /// checked against the exchange.
    pub async fn sweep_once(&self) -> Result<usize> {
        let pairs = self.store.active_pairs().await?;
        if pairs.is_empty() {
            warn!("No active buy-then-sell pairs in settings");
            return Ok(0);
        }

        let mut checked = 0;
        for pair in &pairs {
            let client = self.connector.connect(&pair.credentials());
            checked += self.reconcile_symbol(client.as_ref(), &pair.symbol).await?;
        }
        Ok(checked)
    }

    async fn reconcile_symbol(&self, client: &dyn ExchangeClient, symbol: &str) -> Result<usize> {
        let stale = self.store.stale_orders(symbol, STALE_ORDER_LIMIT).await?;
        if stale.is_empty() {
            debug!(symbol, "No stale orders to check");
            return Ok(0);
        }

        for order in &stale {
            let check = client.check_order(&order.order_id).await?;
            if check.filled {
                self.store
                    .mark_executed(&order.order_id, Some(check.avg_price), None)
                    .await?;
                settle::settle_cycle(&self.store, &order.cycle_id).await?;
                info!(
                    symbol,
                    side = %order.side,
                    order_id = %order.order_id,
                    avg_price = check.avg_price,
                    "Stale order turned out executed"
                );
            } else {
                // Liveness signal only; the status is the truth until
                // the exchange says otherwise.
                self.store.touch_order(&order.order_id).await?;
                debug!(symbol, side = %order.side, order_id = %order.order_id, "Order still unfilled");
            }
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderSide, OrderStatus, PairSettings, STRATEGY_TAG};
    use paper::{PaperConnector, PaperExchange};
    use store::NewOrder;

    fn pair_settings() -> PairSettings {
        PairSettings {
            symbol: "HONEY-USDT".into(),
            strategy: STRATEGY_TAG.into(),
            active: true,
            amount: 100.0,
            sell_bonus: 0.02,
            check_delay: 5,
            cycle_delay: 3600,
            api_key: "k".into(),
            api_secret: "s".into(),
            api_passphrase: "p".into(),
        }
    }

    async fn record(store: &Store, order_id: &str, cycle_id: &str, side: OrderSide, price: f64, status: OrderStatus) {
        store
            .insert_order(&NewOrder {
                order_id: order_id.into(),
                cycle_id: cycle_id.into(),
                symbol: "HONEY-USDT".into(),
                side,
                price,
                status,
                filled_size: None,
                strategy: STRATEGY_TAG.into(),
            })
            .await
            .unwrap();
    }

    async fn sweeper(ex: Arc<PaperExchange>) -> (Sweeper, Store) {
        let store = Store::in_memory().await.unwrap();
        store.upsert_pair(&pair_settings()).await.unwrap();
        let s = Sweeper::new(store.clone(), Arc::new(PaperConnector::new(ex)));
        (s, store)
    }

    #[tokio::test]
    async fn unfilled_order_keeps_status_and_moves_timestamp_only() {
        let ex = Arc::new(PaperExchange::new(1.0, u32::MAX));
        let (sweeper, store) = sweeper(ex.clone()).await;

        let sell_id = ex.limit_sell("HONEY-USDT", 100.0, 1.02, STRATEGY_TAG).await.unwrap();
        record(&store, &sell_id, "c1", OrderSide::Sell, 1.02, OrderStatus::Open).await;
        let before = store.order(&sell_id).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let checked = sweeper.sweep_once().await.unwrap();
        assert_eq!(checked, 1);

        let after = store.order(&sell_id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Open);
        assert_eq!(after.price, 1.02);
        assert!(after.last_updated > before.last_updated);
        assert!(store.profit("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filled_order_is_executed_and_its_cycle_settled() {
        let ex = Arc::new(PaperExchange::new(1.0, 1));
        let (sweeper, store) = sweeper(ex.clone()).await;

        // BUY leg already confirmed by the waiter in a past life.
        record(&store, "b1", "c1", OrderSide::Buy, 0.0, OrderStatus::Pending).await;
        store.mark_executed("b1", Some(1.0), Some(100.0)).await.unwrap();

        let sell_id = ex.limit_sell("HONEY-USDT", 100.0, 1.02, STRATEGY_TAG).await.unwrap();
        record(&store, &sell_id, "c1", OrderSide::Sell, 1.02, OrderStatus::Open).await;

        sweeper.sweep_once().await.unwrap();

        let sell = store.order(&sell_id).await.unwrap().unwrap();
        assert_eq!(sell.status, OrderStatus::Executed);
        assert_eq!(sell.price, 1.02);

        let profit = store.profit("c1").await.unwrap().unwrap();
        assert_eq!(profit.profit_percent, 2.0);
        assert_eq!(profit.profit_coin, 2.0);
    }

    #[tokio::test]
    async fn batch_reconciliation_is_order_independent() {
        let ex = Arc::new(PaperExchange::new(1.0, 1));
        let (sweeper, store) = sweeper(ex.clone()).await;

        // Two abandoned BUYs from different cycles, both filled on the
        // exchange in the meantime.
        let id_a = ex.market_buy("HONEY-USDT", 100.0, STRATEGY_TAG).await.unwrap();
        let id_b = ex.market_buy("HONEY-USDT", 100.0, STRATEGY_TAG).await.unwrap();
        record(&store, &id_a, "ca", OrderSide::Buy, 0.0, OrderStatus::Pending).await;
        record(&store, &id_b, "cb", OrderSide::Buy, 0.0, OrderStatus::Pending).await;

        sweeper.sweep_once().await.unwrap();

        for id in [&id_a, &id_b] {
            let o = store.order(id).await.unwrap().unwrap();
            assert_eq!(o.status, OrderStatus::Executed);
            assert_eq!(o.price, 1.0);
        }
    }

    #[tokio::test]
    async fn no_active_pairs_is_an_empty_pass() {
        let ex = Arc::new(PaperExchange::new(1.0, 1));
        let store = Store::in_memory().await.unwrap();
        let sweeper = Sweeper::new(store, Arc::new(PaperConnector::new(ex)));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    }
}
