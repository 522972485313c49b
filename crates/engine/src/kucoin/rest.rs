use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::debug;

use common::{
    Credentials, Error, ExchangeClient, ExchangeConnector, FillCheck, Result,
};

const BASE_URL: &str = "https://api.kucoin.com";

/// REST API client for KuCoin spot. Used for order placement and fill
/// queries; one instance per trading pair, built from that pair's
/// credentials.
pub struct KucoinClient {
    creds: Credentials,
    http: Client,
}

impl KucoinClient {
    pub fn new(creds: Credentials) -> Self {
        Self {
            creds,
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    /// Base64-encoded HMAC-SHA256, as KuCoin expects in KC-API-SIGN and
    /// (for API key version 2) KC-API-PASSPHRASE.
    fn sign(&self, payload: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.creds.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        B64.encode(mac.finalize().into_bytes())
    }

    fn signed_headers(&self, method: &str, path: &str, body: &str) -> [(&'static str, String); 5] {
        let ts = Self::timestamp_ms().to_string();
        let signature = self.sign(&format!("{ts}{method}{path}{body}"));
        let passphrase = self.sign(&self.creds.api_passphrase);
        [
            ("KC-API-KEY", self.creds.api_key.clone()),
            ("KC-API-SIGN", signature),
            ("KC-API-TIMESTAMP", ts),
            ("KC-API-PASSPHRASE", passphrase),
            ("KC-API-KEY-VERSION", "2".to_string()),
        ]
    }

    async fn signed_get(&self, path: &str) -> Result<String> {
        let mut req = self.http.get(format!("{BASE_URL}{path}"));
        for (name, value) in self.signed_headers("GET", path, "") {
            req = req.header(name, value);
        }
        let resp = req.send().await.map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    async fn signed_post(&self, path: &str, body: &serde_json::Value) -> Result<String> {
        let body = body.to_string();
        let mut req = self
            .http
            .post(format!("{BASE_URL}{path}"))
            .header("Content-Type", "application/json");
        for (name, value) in self.signed_headers("POST", path, &body) {
            req = req.header(name, value);
        }
        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }

    /// Unwrap KuCoin's `{code, msg, data}` envelope; any code other
    /// than "200000" is an exchange error.
    fn parse<T: DeserializeOwned>(body: &str) -> Result<T> {
        let envelope: ApiEnvelope<T> = serde_json::from_str(body)?;
        if envelope.code != "200000" {
            return Err(Error::Exchange(format!(
                "KuCoin error {}: {}",
                envelope.code,
                envelope.msg.unwrap_or_default()
            )));
        }
        envelope
            .data
            .ok_or_else(|| Error::Exchange("KuCoin response missing data".to_string()))
    }
}

#[async_trait]
impl ExchangeClient for KucoinClient {
    async fn market_buy(&self, symbol: &str, amount: f64, tag: &str) -> Result<String> {
        let body = json!({
            "clientOid": uuid::Uuid::new_v4().to_string(),
            "side": "buy",
            "symbol": symbol,
            "type": "market",
            "size": amount.to_string(),
            "remark": tag,
        });
        debug!(symbol, amount, "Submitting market BUY to KuCoin");
        let resp = self.signed_post("/api/v1/orders", &body).await?;
        let placed: PlacedOrder = Self::parse(&resp)?;
        Ok(placed.order_id)
    }

    async fn limit_sell(
        &self,
        symbol: &str,
        amount: f64,
        price: f64,
        tag: &str,
    ) -> Result<String> {
        let body = json!({
            "clientOid": uuid::Uuid::new_v4().to_string(),
            "side": "sell",
            "symbol": symbol,
            "type": "limit",
            "price": price.to_string(),
            "size": amount.to_string(),
            "timeInForce": "GTC",
            "remark": tag,
        });
        debug!(symbol, amount, price, "Submitting limit SELL to KuCoin");
        let resp = self.signed_post("/api/v1/orders", &body).await?;
        let placed: PlacedOrder = Self::parse(&resp)?;
        Ok(placed.order_id)
    }

    async fn check_order(&self, order_id: &str) -> Result<FillCheck> {
        let resp = self.signed_get(&format!("/api/v1/orders/{order_id}")).await?;
        let detail: OrderDetail = Self::parse(&resp)?;
        Ok(detail.fill_check())
    }
}

/// Builds a fresh [`KucoinClient`] for each pair's credentials.
pub struct KucoinConnector;

impl KucoinConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KucoinConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeConnector for KucoinConnector {
    fn connect(&self, creds: &Credentials) -> Arc<dyn ExchangeClient> {
        Arc::new(KucoinClient::new(creds.clone()))
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ApiEnvelope<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacedOrder {
    order_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetail {
    is_active: bool,
    #[serde(default)]
    cancel_exist: bool,
    #[serde(default)]
    deal_funds: String,
    #[serde(default)]
    deal_size: String,
}

impl OrderDetail {
    /// A done, uncancelled order counts as filled; the average price is
    /// dealt funds over dealt size, 0 while nothing has traded.
    fn fill_check(&self) -> FillCheck {
        let funds: f64 = self.deal_funds.parse().unwrap_or(0.0);
        let size: f64 = self.deal_size.parse().unwrap_or(0.0);
        let avg_price = if size > 0.0 { funds / size } else { 0.0 };
        FillCheck {
            filled: !self.is_active && !self.cancel_exist,
            avg_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unwraps_successful_envelope() {
        let body = r#"{"code":"200000","data":{"orderId":"abc123"}}"#;
        let placed: PlacedOrder = KucoinClient::parse(body).unwrap();
        assert_eq!(placed.order_id, "abc123");
    }

    #[test]
    fn parse_surfaces_exchange_error_codes() {
        let body = r#"{"code":"400100","msg":"Insufficient balance"}"#;
        let err = KucoinClient::parse::<PlacedOrder>(body).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("400100"), "{msg}");
        assert!(msg.contains("Insufficient balance"), "{msg}");
    }

    #[test]
    fn done_order_reports_average_fill_price() {
        let body = r#"{"code":"200000","data":{
            "isActive":false,"cancelExist":false,
            "dealFunds":"102.0","dealSize":"100"}}"#;
        let detail: OrderDetail = KucoinClient::parse(body).unwrap();
        let check = detail.fill_check();
        assert!(check.filled);
        assert_eq!(check.avg_price, 1.02);
    }

    #[test]
    fn active_order_is_not_filled() {
        let body = r#"{"code":"200000","data":{
            "isActive":true,"cancelExist":false,
            "dealFunds":"0","dealSize":"0"}}"#;
        let detail: OrderDetail = KucoinClient::parse(body).unwrap();
        let check = detail.fill_check();
        assert!(!check.filled);
        assert_eq!(check.avg_price, 0.0);
    }

    #[test]
    fn cancelled_order_is_not_treated_as_filled() {
        let body = r#"{"code":"200000","data":{
            "isActive":false,"cancelExist":true,
            "dealFunds":"0","dealSize":"0"}}"#;
        let detail: OrderDetail = KucoinClient::parse(body).unwrap();
        assert!(!detail.fill_check().filled);
    }
}
