//! Per-cycle profit settlement.

use chrono::Utc;
use tracing::{debug, info, warn};

use common::{OrderRecord, OrderSide, ProfitRecord, Result, STRATEGY_TAG};
use store::Store;

use crate::pricing::round_dp;

/// Compute and persist the realized profit for a cycle.
///
/// No-ops until both legs are executed, so it can be triggered from
/// whichever leg lands last (waiter or sweeper). A pure function of
/// the stored legs, upserted by cycle id — re-invocation recomputes
/// the same values and overwrites.
///
/// Entry is the earliest-created executed BUY, exit the latest-created
/// executed SELL; extra partial-fill legs beyond those extremes are
/// ignored. Profit is reported in the traded asset's own units;
/// quote-currency profit is intentionally fixed at 0 for this
/// strategy.
pub async fn settle_cycle(store: &Store, cycle_id: &str) -> Result<()> {
    let orders = store.executed_orders(cycle_id).await?;
    if orders.len() < 2 {
        debug!(cycle_id, executed = orders.len(), "Cycle incomplete, skipping settlement");
        return Ok(());
    }

    let buys: Vec<&OrderRecord> = orders
        .iter()
        .filter(|o| o.side == OrderSide::Buy && o.price > 0.0)
        .collect();
    let sells: Vec<&OrderRecord> = orders
        .iter()
        .filter(|o| o.side == OrderSide::Sell && o.price > 0.0)
        .collect();

    // `executed_orders` returns legs oldest-created first.
    let (Some(entry), Some(exit)) = (buys.first(), sells.last()) else {
        warn!(cycle_id, "Missing BUY or SELL prices, skipping settlement");
        return Ok(());
    };

    let buy_qty = entry.filled_size.unwrap_or(0.0);
    let sell_qty = exit.filled_size.unwrap_or(0.0);
    // Fall back to whichever leg reported a size; legacy records may
    // only carry it on one side.
    let qty = if buy_qty > 0.0 && sell_qty > 0.0 {
        buy_qty.min(sell_qty)
    } else {
        buy_qty.max(sell_qty)
    };

    if entry.price <= 0.0 || exit.price <= 0.0 || qty <= 0.0 {
        warn!(
            cycle_id,
            buy_price = entry.price,
            sell_price = exit.price,
            qty,
            "Invalid prices or quantity, skipping settlement"
        );
        return Ok(());
    }

    let spread = (exit.price - entry.price) / entry.price;
    let record = ProfitRecord {
        cycle_id: cycle_id.to_string(),
        symbol: entry.symbol.clone(),
        strategy: STRATEGY_TAG.to_string(),
        buy_price: entry.price,
        sell_price: exit.price,
        profit_percent: round_dp(spread * 100.0, 2),
        profit_coin: round_dp(spread * qty, 6),
        profit_usdt: 0.0,
        execution_secs: (exit.last_updated - entry.last_updated)
            .num_milliseconds()
            .abs() as f64
            / 1000.0,
        last_updated: Utc::now(),
    };
    store.upsert_profit(&record).await?;
    info!(
        cycle_id,
        symbol = %record.symbol,
        profit_percent = record.profit_percent,
        profit_coin = record.profit_coin,
        "Cycle settled"
    );
    Ok(())
}
