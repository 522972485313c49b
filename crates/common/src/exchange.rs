use std::sync::Arc;

use async_trait::async_trait;

use crate::{Credentials, Result};

/// Fill status of a single order as reported by the exchange.
///
/// An `avg_price` of zero or below must be treated as no-fill by
/// callers even when `filled` is true; some venues report a fill
/// before the average price settles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillCheck {
    pub filled: bool,
    pub avg_price: f64,
}

impl FillCheck {
    pub const NOT_FILLED: FillCheck = FillCheck {
        filled: false,
        avg_price: 0.0,
    };
}

/// Abstraction over the exchange connection.
///
/// `KucoinClient` implements this for live trading.
/// `PaperExchange` implements this for simulation and tests.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Place a market BUY for `amount` units. Returns the
    /// exchange-assigned order id.
    async fn market_buy(&self, symbol: &str, amount: f64, tag: &str) -> Result<String>;

    /// Place a limit SELL for `amount` units at `price`. Returns the
    /// exchange-assigned order id.
    async fn limit_sell(&self, symbol: &str, amount: f64, price: f64, tag: &str)
        -> Result<String>;

    /// Query whether an order has been filled, and at what average price.
    async fn check_order(&self, order_id: &str) -> Result<FillCheck>;
}

/// Builds an [`ExchangeClient`] from per-pair credentials.
///
/// Each cycle worker gets its own client at construction; the sweeper
/// reconnects per pair on every pass since credentials differ between
/// pairs. No process-wide client singleton exists.
pub trait ExchangeConnector: Send + Sync {
    fn connect(&self, creds: &Credentials) -> Arc<dyn ExchangeClient>;
}
