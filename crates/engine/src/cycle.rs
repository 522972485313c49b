//! The buy-then-sell cycle state machine, one worker per trading pair.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use common::{ExchangeClient, OrderSide, OrderStatus, PairSettings, Result, STRATEGY_TAG};
use store::{NewOrder, Store};

use crate::pricing::quantize;
use crate::waiter;

/// Upper bound on waiting for a market BUY to fill.
pub const MARKET_TIMEOUT: Duration = Duration::from_secs(600);
/// Pause after an unexpected error before the next cycle attempt.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(30);
/// Price granularity of the traded pairs.
pub const TICK_SIZE: f64 = 0.00001;

/// How one cycle attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// BUY confirmed and the SELL limit placed. The cycle is retired;
    /// the waiter or sweeper settles it once the SELL fills.
    SellPlaced { cycle_id: String },
    /// The cycle was given up. Any exchange-side order stays live and
    /// is reconciled by the sweeper; the next attempt mints a fresh
    /// cycle id.
    Abandoned {
        cycle_id: String,
        reason: &'static str,
    },
}

/// Explicit walk through one cycle. Failure exits from any state
/// surface as [`CycleOutcome::Abandoned`]; there is no cancellation
/// path for in-flight orders.
enum CycleState {
    PlacingBuy,
    AwaitingFill { buy_id: String },
    PlacingSell { avg_price: f64 },
}

/// Drives one trading pair through its BUY → SELL lifecycle, one cycle
/// at a time, forever. Amount and credentials are fixed for the
/// worker's lifetime; sell bonus and cycle delay are re-read from the
/// store before every cycle.
pub struct CycleWorker {
    settings: PairSettings,
    client: Arc<dyn ExchangeClient>,
    store: Store,
}

impl CycleWorker {
    pub fn new(settings: PairSettings, client: Arc<dyn ExchangeClient>, store: Store) -> Self {
        Self {
            settings,
            client,
            store,
        }
    }

    /// Run the worker loop. Call from `tokio::spawn`. Never returns:
    /// unexpected errors are logged and followed by a fixed backoff.
    pub async fn run(mut self) {
        info!(
            symbol = %self.settings.symbol,
            amount = self.settings.amount,
            sell_bonus = self.settings.sell_bonus_fraction(),
            cycle_delay_secs = self.settings.cycle_delay,
            "Cycle worker started"
        );

        loop {
            self.refresh_settings().await;
            match self.run_cycle().await {
                Ok(CycleOutcome::SellPlaced { cycle_id }) => {
                    info!(
                        symbol = %self.settings.symbol,
                        cycle_id = %cycle_id,
                        delay_secs = self.settings.cycle_delay,
                        "Cycle complete, waiting for next"
                    );
                    sleep(self.settings.cycle_delay()).await;
                }
                Ok(CycleOutcome::Abandoned { cycle_id, reason }) => {
                    warn!(
                        symbol = %self.settings.symbol,
                        cycle_id = %cycle_id,
                        reason,
                        "Cycle abandoned, waiting for next"
                    );
                    sleep(self.settings.cycle_delay()).await;
                }
                Err(e) => {
                    error!(symbol = %self.settings.symbol, error = %e, "Cycle failed");
                    sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Pick up live edits to the tunable parameters. Amount and
    /// credentials stay as loaded at worker start; a vanished settings
    /// row keeps the last-known values.
    pub async fn refresh_settings(&mut self) {
        match self.store.pair(&self.settings.symbol).await {
            Ok(Some(current)) => {
                self.settings.sell_bonus = current.sell_bonus;
                self.settings.cycle_delay = current.cycle_delay;
            }
            Ok(None) => {
                warn!(
                    symbol = %self.settings.symbol,
                    "Settings row gone, keeping last-known parameters"
                );
            }
            Err(e) => {
                warn!(symbol = %self.settings.symbol, error = %e, "Failed to refresh settings");
            }
        }
    }

    /// One full cycle attempt under a freshly minted cycle id.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let cycle_id = Uuid::new_v4().to_string();
        let symbol = self.settings.symbol.clone();
        let amount = self.settings.amount;
        info!(symbol = %symbol, cycle_id = %cycle_id, "New cycle started");

        let mut state = CycleState::PlacingBuy;
        loop {
            state = match state {
                CycleState::PlacingBuy => {
                    match self.client.market_buy(&symbol, amount, STRATEGY_TAG).await {
                        Ok(buy_id) => {
                            self.save_order(&cycle_id, &buy_id, OrderSide::Buy, 0.0).await;
                            CycleState::AwaitingFill { buy_id }
                        }
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "Market BUY failed");
                            return Ok(CycleOutcome::Abandoned {
                                cycle_id,
                                reason: "market BUY rejected",
                            });
                        }
                    }
                }

                CycleState::AwaitingFill { buy_id } => {
                    let check = waiter::await_fill(
                        self.client.as_ref(),
                        &self.store,
                        &buy_id,
                        amount,
                        self.settings.poll_interval(),
                        MARKET_TIMEOUT,
                        Some(&cycle_id),
                    )
                    .await?;

                    if !check.filled {
                        return Ok(CycleOutcome::Abandoned {
                            cycle_id,
                            reason: "BUY not confirmed before timeout",
                        });
                    }
                    if check.avg_price <= 0.0 {
                        warn!(symbol = %symbol, avg_price = check.avg_price, "BUY reported filled without a usable price");
                        return Ok(CycleOutcome::Abandoned {
                            cycle_id,
                            reason: "BUY confirmed with invalid price",
                        });
                    }
                    CycleState::PlacingSell {
                        avg_price: check.avg_price,
                    }
                }

                CycleState::PlacingSell { avg_price } => {
                    let bonus = self.settings.sell_bonus_fraction();
                    let sell_price = quantize(avg_price * (1.0 + bonus), TICK_SIZE);
                    match self
                        .client
                        .limit_sell(&symbol, amount, sell_price, STRATEGY_TAG)
                        .await
                    {
                        Ok(sell_id) => {
                            self.save_order(&cycle_id, &sell_id, OrderSide::Sell, sell_price)
                                .await;
                            info!(
                                symbol = %symbol,
                                cycle_id = %cycle_id,
                                sell_price,
                                bonus_pct = bonus * 100.0,
                                "SELL limit placed"
                            );
                            return Ok(CycleOutcome::SellPlaced { cycle_id });
                        }
                        Err(e) => {
                            // The filled BUY stays unsold; the sweeper
                            // does not auto-remediate this.
                            warn!(symbol = %symbol, error = %e, "Limit SELL failed");
                            return Ok(CycleOutcome::Abandoned {
                                cycle_id,
                                reason: "limit SELL rejected",
                            });
                        }
                    }
                }
            };
        }
    }

    /// Persist an order record. The exchange-side order already exists,
    /// so a failed write must never abort the cycle — it is logged and
    /// left to the sweeper's next pass.
    async fn save_order(&self, cycle_id: &str, order_id: &str, side: OrderSide, price: f64) {
        let (status, filled_size) = match side {
            OrderSide::Buy => (OrderStatus::Pending, None),
            OrderSide::Sell => (OrderStatus::Open, None),
        };
        let order = NewOrder {
            order_id: order_id.to_string(),
            cycle_id: cycle_id.to_string(),
            symbol: self.settings.symbol.clone(),
            side,
            price,
            status,
            filled_size,
            strategy: STRATEGY_TAG.to_string(),
        };
        if let Err(e) = self.store.insert_order(&order).await {
            error!(
                symbol = %self.settings.symbol,
                side = %side,
                order_id,
                error = %e,
                "Failed to save order record"
            );
        }
    }
}
