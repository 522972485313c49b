//! Polling wait for order execution.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use common::{ExchangeClient, FillCheck, Result};
use store::Store;

use crate::settle;

/// Poll the exchange until `order_id` fills or `timeout` elapses.
///
/// On fill, the order record is marked executed (fill price, size,
/// timestamp) before this returns, and settlement is attempted for the
/// cycle — a no-op while the other leg is still outstanding. Store
/// failures on this path are logged, not returned: the exchange-side
/// fill already happened and must reach the caller; the sweeper
/// repairs the record later.
///
/// On timeout the order is NOT cancelled — it stays live on the
/// exchange and the local record stays pending/open for the sweeper.
/// Callers must treat a non-positive `avg_price` as no-fill even when
/// `filled` is true.
pub async fn await_fill(
    client: &dyn ExchangeClient,
    store: &Store,
    order_id: &str,
    filled_size: f64,
    poll_interval: Duration,
    timeout: Duration,
    cycle_id: Option<&str>,
) -> Result<FillCheck> {
    let started = Instant::now();
    loop {
        let check = client.check_order(order_id).await?;
        if check.filled {
            info!(order_id, avg_price = check.avg_price, "Order executed");
            if let Err(e) = store
                .mark_executed(order_id, Some(check.avg_price), Some(filled_size))
                .await
            {
                error!(order_id, error = %e, "Failed to persist fill");
            }
            if let Some(cycle_id) = cycle_id {
                if let Err(e) = settle::settle_cycle(store, cycle_id).await {
                    error!(cycle_id, error = %e, "Profit settlement failed");
                }
            }
            return Ok(check);
        }

        if started.elapsed() >= timeout {
            warn!(
                order_id,
                timeout_secs = timeout.as_secs(),
                "Order not filled before timeout, leaving it to the sweeper"
            );
            return Ok(FillCheck::NOT_FILLED);
        }

        sleep(poll_interval).await;
    }
}
