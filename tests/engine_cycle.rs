// Full decision cycles against an in-memory exchange
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Mutex;
use std::time::Duration;

use lrcbot::api::{Exchange, Notifier};
use lrcbot::error::{BotError, Stage};
use lrcbot::execution::{CycleOutcome, SignalEngine};
use lrcbot::models::{Candle, InstrumentSpec, OrderConfirmation, OrderIntent, PositionState, Side};
use lrcbot::risk::{RiskParameters, RiskSizer};
use lrcbot::strategy::{ChannelBreakoutStrategy, SignalConfig};
use lrcbot::Result;

const SYMBOL: &str = "SOLUSDT";

struct MockExchange {
    candles: Vec<Candle>,
    position: PositionState,
    equity: Option<f64>,
    reject_orders: bool,
    last_price: Option<f64>,
    candle_delay: Option<Duration>,
    equity_calls: Mutex<usize>,
    orders: Mutex<Vec<OrderIntent>>,
}

impl MockExchange {
    fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            position: PositionState::Flat,
            equity: Some(10_000.0),
            reject_orders: false,
            last_price: None,
            candle_delay: None,
            equity_calls: Mutex::new(0),
            orders: Mutex::new(Vec::new()),
        }
    }

    fn orders(&self) -> Vec<OrderIntent> {
        self.orders.lock().unwrap().clone()
    }

    fn last_close(&self) -> f64 {
        self.candles.last().map(|c| c.close).unwrap_or(0.0)
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fetch_candles(&self, _symbol: &str, _interval: &str, limit: usize) -> Result<Vec<Candle>> {
        if let Some(delay) = self.candle_delay {
            tokio::time::sleep(delay).await;
        }
        let start = self.candles.len().saturating_sub(limit);
        Ok(self.candles[start..].to_vec())
    }

    async fn fetch_open_position(&self, _symbol: &str) -> Result<PositionState> {
        Ok(self.position.clone())
    }

    async fn fetch_equity(&self) -> Result<f64> {
        *self.equity_calls.lock().unwrap() += 1;
        self.equity
            .ok_or_else(|| BotError::external(Stage::FetchEquity, "wallet endpoint unavailable"))
    }

    async fn fetch_last_price(&self, _symbol: &str) -> Result<f64> {
        Ok(self.last_price.unwrap_or_else(|| self.last_close()))
    }

    async fn submit_order(&self, _symbol: &str, intent: &OrderIntent) -> Result<OrderConfirmation> {
        if self.reject_orders {
            return Err(BotError::external(Stage::SubmitOrder, "retCode 110007: insufficient balance"));
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(intent.clone());
        Ok(OrderConfirmation {
            order_id: format!("order-{}", orders.len()),
            order_link_id: format!("link-{}", orders.len()),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    fail: bool,
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(BotError::Notification("chat not found".to_string()));
        }
        Ok(())
    }
}

/// Gently trending zig-zag with a 10 point breakout bar on triple volume
fn breakout_candles(direction: f64) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut closes: Vec<f64> = (0..50)
        .map(|i| {
            let wiggle = if i % 2 == 1 { 0.3 } else { -0.3 };
            100.0 + direction * 0.1 * i as f64 + wiggle
        })
        .collect();
    closes[49] = closes[48] + direction * 10.0;

    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: start + ChronoDuration::minutes(5 * i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: if i == 49 { 3000.0 } else { 1000.0 },
        })
        .collect()
}

fn engine() -> SignalEngine {
    let instrument = InstrumentSpec::default();
    SignalEngine::new(
        SYMBOL,
        "5",
        50,
        ChannelBreakoutStrategy::new(RiskParameters::default(), SignalConfig::default()),
        RiskSizer::new(1.5, 1000.0, instrument).unwrap(),
        instrument,
        Duration::from_secs(10),
    )
    .unwrap()
}

#[tokio::test]
async fn test_long_breakout_places_bracketed_buy() {
    let exchange = MockExchange::new(breakout_candles(1.0));
    let notifier = RecordingNotifier::default();

    let outcome = engine().run_cycle(&exchange, &notifier).await.unwrap();

    assert!(matches!(outcome, CycleOutcome::OrderPlaced(ref c) if c.order_id == "order-1"));

    let orders = exchange.orders();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    let close = exchange.last_close();
    assert_eq!(order.side(), Side::Long);
    // 100 / (ATR ~1.768 * 1.5) / 114.5, floored to 0.001
    assert!((order.quantity() - 0.329).abs() < 1e-9, "qty {}", order.quantity());
    assert!(order.stop_loss() < close && close < order.take_profit());
    assert!((order.stop_loss() - 100.88).abs() < 0.011, "stop {}", order.stop_loss());
    assert!((order.take_profit() - 141.75).abs() < 0.011, "target {}", order.take_profit());

    // Signal alert then fill alert
    let messages = notifier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("LONG") && messages[0].contains(SYMBOL));
    assert!(messages[1].contains("order-1"));
}

#[tokio::test]
async fn test_short_breakout_places_bracketed_sell() {
    let exchange = MockExchange::new(breakout_candles(-1.0));
    let notifier = RecordingNotifier::default();

    let outcome = engine().run_cycle(&exchange, &notifier).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::OrderPlaced(_)));

    let orders = exchange.orders();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    let close = exchange.last_close();
    assert_eq!(order.side(), Side::Short);
    assert!((order.quantity() - 0.442).abs() < 1e-9, "qty {}", order.quantity());
    assert!(order.take_profit() < close && close < order.stop_loss());
}

#[tokio::test]
async fn test_open_position_blocks_new_entry() {
    let mut exchange = MockExchange::new(breakout_candles(1.0));
    exchange.position = PositionState::Open {
        side: Side::Long,
        size: 0.5,
        entry_price: 104.0,
    };
    let notifier = RecordingNotifier::default();

    let outcome = engine().run_cycle(&exchange, &notifier).await.unwrap();

    assert_eq!(outcome, CycleOutcome::PositionOpen(Side::Long));
    assert!(exchange.orders().is_empty());
    assert_eq!(*exchange.equity_calls.lock().unwrap(), 0);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_quiet_market_takes_no_action() {
    let mut candles = breakout_candles(1.0);
    candles.pop();
    let exchange = MockExchange::new(candles);
    let notifier = RecordingNotifier::default();

    let outcome = engine().run_cycle(&exchange, &notifier).await.unwrap();

    assert_eq!(outcome, CycleOutcome::NoAction);
    assert!(exchange.orders().is_empty());
}

#[tokio::test]
async fn test_short_history_is_skipped_without_alert() {
    let candles = breakout_candles(1.0)[40..].to_vec();
    let exchange = MockExchange::new(candles);
    let notifier = RecordingNotifier::default();

    let outcome = engine().run_cycle(&exchange, &notifier).await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Skipped(_)));
    assert!(exchange.orders().is_empty());
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_equity_failure_sizes_with_fallback() {
    let mut exchange = MockExchange::new(breakout_candles(1.0));
    exchange.equity = None;
    let notifier = RecordingNotifier::default();

    let outcome = engine().run_cycle(&exchange, &notifier).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::OrderPlaced(_)));

    // Same trade sized on 1000 instead of 10000
    let orders = exchange.orders();
    assert!((orders[0].quantity() - 0.032).abs() < 1e-9, "qty {}", orders[0].quantity());
}

#[tokio::test]
async fn test_rejected_order_fails_cycle_and_alerts_stage() {
    let mut exchange = MockExchange::new(breakout_candles(1.0));
    exchange.reject_orders = true;
    let notifier = RecordingNotifier::default();

    let result = engine().run_cycle(&exchange, &notifier).await;

    match result {
        Err(BotError::ExternalService { stage, .. }) => assert_eq!(stage, Stage::SubmitOrder),
        other => panic!("expected submit failure, got {:?}", other),
    }

    let messages = notifier.messages();
    let failure = messages.last().unwrap();
    assert!(failure.contains(SYMBOL));
    assert!(failure.contains("submit_order"));
}

#[tokio::test]
async fn test_notification_failure_does_not_abort_cycle() {
    let exchange = MockExchange::new(breakout_candles(1.0));
    let notifier = RecordingNotifier::failing();

    let outcome = engine().run_cycle(&exchange, &notifier).await.unwrap();

    assert!(matches!(outcome, CycleOutcome::OrderPlaced(_)));
    assert_eq!(exchange.orders().len(), 1);
    assert_eq!(notifier.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_market_data_times_out() {
    let mut exchange = MockExchange::new(breakout_candles(1.0));
    exchange.candle_delay = Some(Duration::from_secs(30));
    let notifier = RecordingNotifier::default();

    let result = engine().run_cycle(&exchange, &notifier).await;

    assert!(matches!(
        result,
        Err(BotError::ExternalService { stage: Stage::FetchCandles, .. })
    ));
    assert!(exchange.orders().is_empty());
}

#[tokio::test]
async fn test_repeated_cycles_follow_live_position() {
    let exchange = MockExchange::new(breakout_candles(1.0));
    let notifier = RecordingNotifier::default();
    let engine = engine();

    // Nothing is cached: a flat oracle lets the same breakout through again
    engine.run_cycle(&exchange, &notifier).await.unwrap();
    engine.run_cycle(&exchange, &notifier).await.unwrap();

    let orders = exchange.orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0], orders[1]);
}

#[tokio::test]
async fn test_unsizable_trade_after_alert_is_skipped() {
    let mut exchange = MockExchange::new(breakout_candles(1.0));
    exchange.last_price = Some(0.0);
    let notifier = RecordingNotifier::default();

    let outcome = engine().run_cycle(&exchange, &notifier).await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Skipped(ref reason) if reason.contains("price")));
    assert!(exchange.orders().is_empty());
    // Only the signal alert went out
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("LONG"));
}
