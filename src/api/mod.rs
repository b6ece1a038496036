// External collaborators: exchange account and alert channel
pub mod bybit;
pub mod telegram;

use async_trait::async_trait;

use crate::models::{Candle, OrderConfirmation, OrderIntent, PositionState};
use crate::Result;

pub use bybit::BybitClient;
pub use telegram::{AlertChannel, TelegramNotifier};

/// Everything the signal engine needs from the exchange account
///
/// Covers the market data gate (candles, last price), the position oracle
/// (open position, equity) and the order execution gate.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Up to `limit` candles, oldest first
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;

    async fn fetch_open_position(&self, symbol: &str) -> Result<PositionState>;

    /// Account equity in the quote currency
    async fn fetch_equity(&self) -> Result<f64>;

    async fn fetch_last_price(&self, symbol: &str) -> Result<f64>;

    /// Market order with take-profit and stop-loss attached in the same request
    async fn submit_order(&self, symbol: &str, intent: &OrderIntent) -> Result<OrderConfirmation>;
}

/// Best-effort outbound alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}
