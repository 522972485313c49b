use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use common::{Credentials, Error, ExchangeClient, ExchangeConnector, FillCheck, Result};

/// Simulated exchange for paper trading and engine tests.
///
/// Orders are accepted immediately and report filled once
/// `check_order` has been called `fill_after_checks` times for them.
/// Market buys fill at the configured per-symbol price (or the default
/// price), limit sells fill at their limit price. Pass `u32::MAX` for
/// an exchange that never fills.
pub struct PaperExchange {
    /// Reference price per symbol, used as the market-buy fill price.
    prices: RwLock<HashMap<String, f64>>,
    default_price: f64,
    fill_after_checks: u32,
    orders: RwLock<HashMap<String, PaperOrder>>,
    reject_placements: AtomicBool,
}

struct PaperOrder {
    avg_price: f64,
    checks: u32,
}

impl PaperExchange {
    pub fn new(default_price: f64, fill_after_checks: u32) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            default_price,
            fill_after_checks,
            orders: RwLock::new(HashMap::new()),
            reject_placements: AtomicBool::new(false),
        }
    }

    /// Set the reference price market buys fill at for a symbol.
    pub async fn set_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// When set, all placements are rejected with an exchange error.
    pub fn reject_placements(&self, reject: bool) {
        self.reject_placements.store(reject, Ordering::SeqCst);
    }

    /// Number of status checks an order has received so far.
    pub async fn checks(&self, order_id: &str) -> u32 {
        self.orders
            .read()
            .await
            .get(order_id)
            .map(|o| o.checks)
            .unwrap_or(0)
    }

    async fn place(&self, kind: &str, symbol: &str, avg_price: f64, tag: &str) -> Result<String> {
        if self.reject_placements.load(Ordering::SeqCst) {
            return Err(Error::Exchange(format!(
                "paper: {kind} placement rejected for {symbol}"
            )));
        }
        let order_id = format!("paper-{}", uuid::Uuid::new_v4());
        self.orders.write().await.insert(
            order_id.clone(),
            PaperOrder {
                avg_price,
                checks: 0,
            },
        );
        debug!(symbol, kind, tag, order_id = %order_id, price = avg_price, "Paper order accepted");
        Ok(order_id)
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn market_buy(&self, symbol: &str, _amount: f64, tag: &str) -> Result<String> {
        let price = self
            .prices
            .read()
            .await
            .get(symbol)
            .copied()
            .unwrap_or(self.default_price);
        self.place("market buy", symbol, price, tag).await
    }

    async fn limit_sell(
        &self,
        symbol: &str,
        _amount: f64,
        price: f64,
        tag: &str,
    ) -> Result<String> {
        self.place("limit sell", symbol, price, tag).await
    }

    async fn check_order(&self, order_id: &str) -> Result<FillCheck> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| Error::Exchange(format!("paper: unknown order {order_id}")))?;
        order.checks = order.checks.saturating_add(1);
        if order.checks >= self.fill_after_checks {
            Ok(FillCheck {
                filled: true,
                avg_price: order.avg_price,
            })
        } else {
            Ok(FillCheck::NOT_FILLED)
        }
    }
}

/// Connector that hands every worker the same shared simulation,
/// ignoring credentials.
pub struct PaperConnector {
    exchange: Arc<PaperExchange>,
}

impl PaperConnector {
    pub fn new(exchange: Arc<PaperExchange>) -> Self {
        Self { exchange }
    }
}

impl ExchangeConnector for PaperConnector {
    fn connect(&self, _creds: &Credentials) -> Arc<dyn ExchangeClient> {
        self.exchange.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn market_buy_fills_at_symbol_price() {
        let ex = PaperExchange::new(1.0, 1);
        ex.set_price("HONEY-USDT", 1.2345).await;

        let id = ex.market_buy("HONEY-USDT", 100.0, "BUY_SELL").await.unwrap();
        let check = ex.check_order(&id).await.unwrap();
        assert!(check.filled);
        assert_eq!(check.avg_price, 1.2345);
    }

    #[tokio::test]
    async fn limit_sell_fills_at_limit_price() {
        let ex = PaperExchange::new(1.0, 1);
        let id = ex.limit_sell("HONEY-USDT", 100.0, 1.02, "BUY_SELL").await.unwrap();
        let check = ex.check_order(&id).await.unwrap();
        assert!(check.filled);
        assert_eq!(check.avg_price, 1.02);
    }

    #[tokio::test]
    async fn order_fills_only_after_configured_checks() {
        let ex = PaperExchange::new(1.0, 3);
        let id = ex.market_buy("HONEY-USDT", 100.0, "BUY_SELL").await.unwrap();

        assert!(!ex.check_order(&id).await.unwrap().filled);
        assert!(!ex.check_order(&id).await.unwrap().filled);
        assert!(ex.check_order(&id).await.unwrap().filled);
        assert_eq!(ex.checks(&id).await, 3);
    }

    #[tokio::test]
    async fn rejected_placement_returns_exchange_error() {
        let ex = PaperExchange::new(1.0, 1);
        ex.reject_placements(true);
        let err = ex.market_buy("HONEY-USDT", 100.0, "BUY_SELL").await;
        assert!(matches!(err, Err(Error::Exchange(_))));
    }

    #[tokio::test]
    async fn unknown_order_is_an_error() {
        let ex = PaperExchange::new(1.0, 1);
        assert!(ex.check_order("missing").await.is_err());
    }
}
