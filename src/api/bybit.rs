use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::Exchange;
use crate::error::{BotError, Stage};
use crate::models::{Candle, InstrumentSpec, OrderConfirmation, OrderIntent, PositionState, Side};
use crate::Result;

const BYBIT_MAINNET: &str = "https://api.bybit.com";
const BYBIT_TESTNET: &str = "https://api-testnet.bybit.com";
const CATEGORY: &str = "linear";
const RECV_WINDOW_MS: u64 = 5000;
const RATE_LIMIT_PER_SEC: u32 = 10;
const QUOTE_COIN: &str = "USDT";

type HmacSha256 = Hmac<Sha256>;

type BybitRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Bybit v5 REST client for USDT linear perpetuals
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    instrument: InstrumentSpec,
    rate_limiter: Arc<BybitRateLimiter>,
}

/// Common v5 response wrapper
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    ret_msg: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerEntry {
    last_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionEntry {
    side: String,
    size: String,
    avg_price: String,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    coin: Vec<WalletCoin>,
}

#[derive(Debug, Deserialize)]
struct WalletCoin {
    coin: String,
    equity: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest<'a> {
    category: &'a str,
    symbol: &'a str,
    side: &'a str,
    order_type: &'a str,
    qty: String,
    take_profit: String,
    stop_loss: String,
    order_link_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResult {
    order_id: String,
    #[serde(default)]
    order_link_id: String,
}

impl BybitClient {
    /// Client for mainnet, or testnet when `testnet` is set
    pub fn new(
        api_key: String,
        api_secret: String,
        testnet: bool,
        timeout: Duration,
        instrument: InstrumentSpec,
    ) -> Result<Self> {
        let base_url = if testnet {
            tracing::info!("Using Bybit TESTNET");
            BYBIT_TESTNET
        } else {
            tracing::info!("Using Bybit MAINNET");
            BYBIT_MAINNET
        };
        Self::with_base_url(base_url, api_key, api_secret, timeout, instrument)
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: String,
        api_secret: String,
        timeout: Duration,
        instrument: InstrumentSpec,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Config(format!("failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(RATE_LIMIT_PER_SEC).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            instrument,
            rate_limiter,
        })
    }

    /// HMAC-SHA256 over `timestamp + api_key + recv_window + payload`, hex encoded
    fn sign(&self, timestamp: i64, payload: &str) -> std::result::Result<String, String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| format!("invalid API secret: {}", e))?;
        mac.update(format!("{}{}{}{}", timestamp, self.api_key, RECV_WINDOW_MS, payload).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn auth_headers(&self, payload: &str, stage: Stage) -> Result<HeaderMap> {
        let timestamp = Utc::now().timestamp_millis();
        let signature = self
            .sign(timestamp, payload)
            .map_err(|e| BotError::external(stage, e))?;

        let mut headers = HeaderMap::new();
        let mut insert = |name: &'static str, value: String| -> Result<()> {
            let value = HeaderValue::from_str(&value).map_err(|e| BotError::external(stage, e))?;
            headers.insert(name, value);
            Ok(())
        };
        insert("x-bapi-api-key", self.api_key.clone())?;
        insert("x-bapi-timestamp", timestamp.to_string())?;
        insert("x-bapi-recv-window", RECV_WINDOW_MS.to_string())?;
        insert("x-bapi-sign", signature)?;
        Ok(headers)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
        stage: Stage,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let query = serde_urlencoded::to_string(params).map_err(|e| BotError::external(stage, e))?;
        let url = format!("{}{}?{}", self.base_url, path, query);

        let mut request = self.client.get(&url);
        if signed {
            request = request.headers(self.auth_headers(&query, stage)?);
        }

        let response = request.send().await.map_err(|e| BotError::external(stage, e))?;
        Self::parse(response, stage).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B, stage: Stage) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let body = serde_json::to_string(body).map_err(|e| BotError::external(stage, e))?;
        let url = format!("{}{}", self.base_url, path);
        let mut headers = self.auth_headers(&body, stage)?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| BotError::external(stage, e))?;
        Self::parse(response, stage).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, stage: Stage) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BotError::external(stage, format!("HTTP {}: {}", status, body)));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| BotError::external(stage, format!("malformed response: {}", e)))?;

        if envelope.ret_code != 0 {
            return Err(BotError::external(
                stage,
                format!("retCode {}: {}", envelope.ret_code, envelope.ret_msg),
            ));
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| BotError::external(stage, format!("unexpected result shape: {}", e)))
    }
}

/// Parse a decimal string, rejecting NaN and infinities
fn parse_number(raw: &str, field: &str, stage: Stage) -> Result<f64> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(BotError::external(stage, format!("{} is not a number: {:?}", field, raw))),
    }
}

/// Kline rows are `[startTime, open, high, low, close, volume, turnover]`, newest first
fn parse_kline_row(row: &[String]) -> Result<Candle> {
    let stage = Stage::FetchCandles;
    if row.len() < 6 {
        return Err(BotError::external(stage, format!("kline row has {} fields", row.len())));
    }

    let start_ms: i64 = row[0]
        .parse()
        .map_err(|_| BotError::external(stage, format!("bad kline timestamp {:?}", row[0])))?;
    let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(start_ms)
        .ok_or_else(|| BotError::external(stage, format!("kline timestamp out of range: {}", start_ms)))?;

    Ok(Candle {
        timestamp,
        open: parse_number(&row[1], "open", stage)?,
        high: parse_number(&row[2], "high", stage)?,
        low: parse_number(&row[3], "low", stage)?,
        close: parse_number(&row[4], "close", stage)?,
        volume: parse_number(&row[5], "volume", stage)?,
    })
}

#[async_trait]
impl Exchange for BybitClient {
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let params = [
            ("category", CATEGORY.to_string()),
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let result: ListResult<Vec<String>> = self
            .get("/v5/market/kline", &params, false, Stage::FetchCandles)
            .await?;

        let mut candles = result
            .list
            .iter()
            .map(|row| parse_kline_row(row))
            .collect::<Result<Vec<_>>>()?;

        // Sort by timestamp (oldest first)
        candles.sort_by_key(|c| c.timestamp);

        tracing::debug!(symbol, interval, count = candles.len(), "Fetched candles");
        Ok(candles)
    }

    async fn fetch_open_position(&self, symbol: &str) -> Result<PositionState> {
        let stage = Stage::FetchPosition;
        let params = [("category", CATEGORY.to_string()), ("symbol", symbol.to_string())];
        let result: ListResult<PositionEntry> = self.get("/v5/position/list", &params, true, stage).await?;

        // Hedge-mode accounts report one row per side, the empty one included
        let mut open = None;
        for entry in &result.list {
            let size = if entry.size.is_empty() {
                0.0
            } else {
                parse_number(&entry.size, "size", stage)?
            };
            if size > 0.0 {
                open = Some((entry, size));
                break;
            }
        }
        let Some((entry, size)) = open else {
            return Ok(PositionState::Flat);
        };

        let side = match entry.side.as_str() {
            "Buy" => Side::Long,
            "Sell" => Side::Short,
            other => {
                return Err(BotError::external(
                    stage,
                    format!("open position with unknown side {:?}", other),
                ))
            }
        };

        Ok(PositionState::Open {
            side,
            size,
            entry_price: parse_number(&entry.avg_price, "avgPrice", stage)?,
        })
    }

    async fn fetch_equity(&self) -> Result<f64> {
        let stage = Stage::FetchEquity;
        let params = [("accountType", "UNIFIED".to_string())];
        let result: ListResult<WalletAccount> = self
            .get("/v5/account/wallet-balance", &params, true, stage)
            .await?;

        let coin = result
            .list
            .first()
            .and_then(|account| account.coin.iter().find(|c| c.coin == QUOTE_COIN));

        match coin {
            Some(coin) if !coin.equity.is_empty() => parse_number(&coin.equity, "equity", stage),
            // No quote balance on the account
            _ => Ok(0.0),
        }
    }

    async fn fetch_last_price(&self, symbol: &str) -> Result<f64> {
        let stage = Stage::FetchLastPrice;
        let params = [("category", CATEGORY.to_string()), ("symbol", symbol.to_string())];
        let result: ListResult<TickerEntry> = self.get("/v5/market/tickers", &params, false, stage).await?;

        let ticker = result
            .list
            .first()
            .ok_or_else(|| BotError::external(stage, format!("no ticker for {}", symbol)))?;
        let price = parse_number(&ticker.last_price, "lastPrice", stage)?;
        if price <= 0.0 {
            return Err(BotError::external(stage, format!("non-positive last price {}", price)));
        }
        Ok(price)
    }

    async fn submit_order(&self, symbol: &str, intent: &OrderIntent) -> Result<OrderConfirmation> {
        let order_link_id = Uuid::new_v4().simple().to_string();
        let request = CreateOrderRequest {
            category: CATEGORY,
            symbol,
            side: intent.side().order_side(),
            order_type: "Market",
            qty: self.instrument.format_qty(intent.quantity()),
            take_profit: self.instrument.format_price(intent.take_profit()),
            stop_loss: self.instrument.format_price(intent.stop_loss()),
            order_link_id: order_link_id.clone(),
        };

        let result: CreateOrderResult = self.post("/v5/order/create", &request, Stage::SubmitOrder).await?;

        tracing::info!(
            symbol,
            side = request.side,
            qty = %request.qty,
            take_profit = %request.take_profit,
            stop_loss = %request.stop_loss,
            order_id = %result.order_id,
            "Order placed"
        );

        Ok(OrderConfirmation {
            order_id: result.order_id,
            order_link_id: if result.order_link_id.is_empty() {
                order_link_id
            } else {
                result.order_link_id
            },
        })
    }
}
