use chrono::Utc;
use std::future::Future;
use std::time::Duration;

use crate::api::{Exchange, Notifier};
use crate::error::{BotError, Stage};
use crate::models::{InstrumentSpec, OrderConfirmation, OrderIntent, PositionState, Side, Signal};
use crate::risk::RiskSizer;
use crate::strategy::{ChannelBreakoutStrategy, MarketSnapshot};
use crate::Result;

/// What the engine would do with one snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    OpenLong(OrderIntent),
    OpenShort(OrderIntent),
    NoAction(String),
}

/// How a cycle ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Not enough candles yet
    Skipped(String),
    NoAction,
    /// A position is already open, entries are not evaluated
    PositionOpen(Side),
    OrderPlaced(OrderConfirmation),
}

/// Runs one decision cycle for a single symbol
///
/// Nothing is cached between cycles: candles, position and equity are
/// fetched fresh each time and discarded once the decision is made.
pub struct SignalEngine {
    symbol: String,
    interval: String,
    candle_limit: usize,
    strategy: ChannelBreakoutStrategy,
    sizer: RiskSizer,
    instrument: InstrumentSpec,
    call_timeout: Duration,
}

impl SignalEngine {
    pub fn new(
        symbol: impl Into<String>,
        interval: impl Into<String>,
        candle_limit: usize,
        strategy: ChannelBreakoutStrategy,
        sizer: RiskSizer,
        instrument: InstrumentSpec,
        call_timeout: Duration,
    ) -> Result<Self> {
        let required = strategy.min_candles_required();
        if candle_limit < required {
            return Err(BotError::Config(format!(
                "candle_limit {} is below the {} candles the indicators need",
                candle_limit, required
            )));
        }

        Ok(Self {
            symbol: symbol.into(),
            interval: interval.into(),
            candle_limit,
            strategy,
            sizer,
            instrument,
            call_timeout,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn strategy(&self) -> &ChannelBreakoutStrategy {
        &self.strategy
    }

    /// Decision for a snapshot, position and account state
    ///
    /// Pure: the same inputs always give the same decision.
    pub fn decide(
        &self,
        snapshot: &MarketSnapshot,
        position: &PositionState,
        equity: f64,
        last_price: f64,
    ) -> Result<Decision> {
        match self.strategy.generate_signal(snapshot, position) {
            Signal::Long => Ok(Decision::OpenLong(self.build_intent(Side::Long, snapshot, equity, last_price)?)),
            Signal::Short => Ok(Decision::OpenShort(self.build_intent(Side::Short, snapshot, equity, last_price)?)),
            Signal::Hold => Ok(Decision::NoAction(match position.side() {
                Some(side) => format!("{} position open", side.label()),
                None => "no breakout".to_string(),
            })),
        }
    }

    /// Sized, rounded and validated order for an entry on `side`
    pub fn build_intent(
        &self,
        side: Side,
        snapshot: &MarketSnapshot,
        equity: f64,
        last_price: f64,
    ) -> Result<OrderIntent> {
        let quantity = self.sizer.size(
            equity,
            self.strategy.params().risk_fraction,
            snapshot.atr,
            last_price,
        )?;

        let (stop_loss, take_profit) = self.strategy.exit_levels(side, snapshot);
        let stop_loss = self.instrument.round_price(stop_loss);
        let take_profit = self.instrument.round_price(take_profit);

        OrderIntent::new(side, quantity, take_profit, stop_loss, snapshot.close)
    }

    /// One full cycle against the exchange
    ///
    /// Failures are alerted with symbol and stage before being returned.
    pub async fn run_cycle(&self, exchange: &dyn Exchange, notifier: &dyn Notifier) -> Result<CycleOutcome> {
        match self.cycle(exchange, notifier).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_skip() => {
                tracing::info!(symbol = %self.symbol, reason = %e, "Skipping cycle");
                Ok(CycleOutcome::Skipped(e.to_string()))
            }
            Err(e) => {
                let stage = e
                    .stage()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "evaluate".to_string());
                tracing::error!(symbol = %self.symbol, stage = %stage, error = %e, "Cycle failed");
                self.alert(
                    notifier,
                    &format!("⚠️ *{}* cycle failed at `{}`: {}", self.symbol, stage, e),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn cycle(&self, exchange: &dyn Exchange, notifier: &dyn Notifier) -> Result<CycleOutcome> {
        let candles = self
            .bounded(
                Stage::FetchCandles,
                exchange.fetch_candles(&self.symbol, &self.interval, self.candle_limit),
            )
            .await?;
        let snapshot = self.strategy.snapshot(&candles)?;

        tracing::debug!(
            symbol = %self.symbol,
            close = snapshot.close,
            upper = snapshot.channel.upper,
            lower = snapshot.channel.lower,
            slope = snapshot.channel.slope,
            rsi = snapshot.rsi,
            atr = snapshot.atr,
            "Snapshot"
        );

        let position = self
            .bounded(Stage::FetchPosition, exchange.fetch_open_position(&self.symbol))
            .await?;

        let side = match self.strategy.generate_signal(&snapshot, &position) {
            Signal::Long => Side::Long,
            Signal::Short => Side::Short,
            Signal::Hold => {
                return Ok(match position.side() {
                    Some(open) => {
                        tracing::debug!(symbol = %self.symbol, side = open.label(), "Position open, not evaluating entries");
                        CycleOutcome::PositionOpen(open)
                    }
                    None => CycleOutcome::NoAction,
                });
            }
        };

        tracing::info!(symbol = %self.symbol, side = side.label(), close = snapshot.close, "🎯 Breakout detected");
        self.alert(
            notifier,
            &format!(
                "🚨 *{} signal* on {}\nPrice: {:.4}\nTime: {}",
                side.label(),
                self.symbol,
                snapshot.close,
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ),
        )
        .await;

        let equity = self
            .sizer
            .resolve_equity(self.bounded(Stage::FetchEquity, exchange.fetch_equity()).await);
        let last_price = self
            .bounded(Stage::FetchLastPrice, exchange.fetch_last_price(&self.symbol))
            .await?;

        let intent = match self.build_intent(side, &snapshot, equity, last_price) {
            Ok(intent) => intent,
            Err(e) if e.is_skip() => {
                tracing::warn!(
                    symbol = %self.symbol,
                    side = side.label(),
                    reason = %e,
                    "Signal alerted but trade dropped before sizing"
                );
                return Ok(CycleOutcome::Skipped(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let confirmation = self
            .bounded(Stage::SubmitOrder, exchange.submit_order(&self.symbol, &intent))
            .await?;

        tracing::info!(
            symbol = %self.symbol,
            side = side.label(),
            qty = intent.quantity(),
            stop_loss = intent.stop_loss(),
            take_profit = intent.take_profit(),
            order_id = %confirmation.order_id,
            "✅ Entry submitted"
        );
        self.alert(
            notifier,
            &format!(
                "✅ *{}* {} opened\nQty: {}\nSL: {} | TP: {}\nOrder: `{}`",
                side.label(),
                self.symbol,
                self.instrument.format_qty(intent.quantity()),
                self.instrument.format_price(intent.stop_loss()),
                self.instrument.format_price(intent.take_profit()),
                confirmation.order_id
            ),
        )
        .await;

        Ok(CycleOutcome::OrderPlaced(confirmation))
    }

    async fn bounded<T>(&self, stage: Stage, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BotError::timeout(stage, self.call_timeout)),
        }
    }

    /// Best effort: failures are logged and swallowed
    async fn alert(&self, notifier: &dyn Notifier, message: &str) {
        let sent = match tokio::time::timeout(self.call_timeout, notifier.notify(message)).await {
            Ok(result) => result,
            Err(_) => Err(BotError::timeout(Stage::Notify, self.call_timeout)),
        };
        if let Err(e) = sent {
            tracing::warn!(symbol = %self.symbol, error = %e, "Alert not delivered");
        }
    }
}
