use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Strategy tag written to every order and profit row of this bot.
pub const STRATEGY_TAG: &str = "BUY_SELL";

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order record. Progresses monotonically
/// pending → (open, SELL only) → executed; no regressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Open,
    Executed,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Executed => write!(f, "executed"),
        }
    }
}

/// Whether the bot trades against the real exchange or a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Per-pair exchange API credentials, stored alongside the pair settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

/// One row of the `settings` table: everything a cycle worker needs to
/// trade a single pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PairSettings {
    pub symbol: String,
    pub strategy: String,
    pub active: bool,
    /// Order size, in the traded asset's own units.
    pub amount: f64,
    /// Markup above the BUY fill price where the SELL limit is placed.
    /// Accepts either a 0–1 fraction or a percentage > 1; use
    /// [`PairSettings::sell_bonus_fraction`] to read it.
    pub sell_bonus: f64,
    /// Fill-poll interval in seconds.
    pub check_delay: i64,
    /// Pause between cycles in seconds.
    pub cycle_delay: i64,
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

impl PairSettings {
    /// Sell bonus normalized to a fraction: values above 1 are read as
    /// percentages (e.g. 2 → 0.02).
    pub fn sell_bonus_fraction(&self) -> f64 {
        if self.sell_bonus > 1.0 {
            self.sell_bonus / 100.0
        } else {
            self.sell_bonus
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.check_delay.max(0) as u64)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_secs(self.cycle_delay.max(0) as u64)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            api_passphrase: self.api_passphrase.clone(),
        }
    }
}

/// One row of the `orders` table. Identity fields (symbol, side,
/// cycle_id, order_id) are written once by the cycle engine; status,
/// price, filled_size and last_updated may later be rewritten by the
/// waiter or the sweeper, last-writer-wins.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: i64,
    /// Exchange-assigned order identifier.
    pub order_id: String,
    /// Correlation id binding the BUY and SELL legs of one cycle.
    pub cycle_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub status: OrderStatus,
    pub filled_size: Option<f64>,
    pub strategy: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// One row of the `profit_per_cycle` table, keyed by cycle id.
/// Recomputing for the same cycle overwrites with identical values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfitRecord {
    pub cycle_id: String,
    pub symbol: String,
    pub strategy: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub profit_percent: f64,
    /// Profit in the traded asset's own units.
    pub profit_coin: f64,
    /// Intentionally 0 for this strategy; quote-currency profit is not
    /// computed.
    pub profit_usdt: f64,
    pub execution_secs: f64,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(sell_bonus: f64) -> PairSettings {
        PairSettings {
            symbol: "HONEY-USDT".into(),
            strategy: STRATEGY_TAG.into(),
            active: true,
            amount: 100.0,
            sell_bonus,
            check_delay: 5,
            cycle_delay: 3600,
            api_key: "k".into(),
            api_secret: "s".into(),
            api_passphrase: "p".into(),
        }
    }

    #[test]
    fn fractional_bonus_passes_through() {
        assert_eq!(settings(0.02).sell_bonus_fraction(), 0.02);
    }

    #[test]
    fn percentage_bonus_is_divided_by_100() {
        assert_eq!(settings(2.0).sell_bonus_fraction(), 0.02);
        assert_eq!(settings(1.5).sell_bonus_fraction(), 0.015);
    }

    #[test]
    fn bonus_of_exactly_one_is_a_fraction() {
        assert_eq!(settings(1.0).sell_bonus_fraction(), 1.0);
    }

    #[test]
    fn side_and_status_display_as_stored() {
        assert_eq!(OrderSide::Buy.to_string(), "BUY");
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
        assert_eq!(OrderStatus::Pending.to_string(), "pending");
        assert_eq!(OrderStatus::Open.to_string(), "open");
        assert_eq!(OrderStatus::Executed.to_string(), "executed");
    }

    #[test]
    fn durations_clamp_negative_delays() {
        let mut s = settings(0.02);
        s.check_delay = -1;
        assert_eq!(s.poll_interval(), Duration::ZERO);
    }
}
