use super::signals::{MarketSnapshot, SignalConfig};
use crate::models::{Candle, PositionState, Side, Signal};
use crate::risk::RiskParameters;
use crate::Result;

/// Linear regression channel breakout
///
/// Enters in the direction of a close that crosses out of the channel,
/// provided the regression slope, RSI and volume agree:
/// - Long: previous close at or below the previous upper band, current close
///   above the current upper band, slope > 0, RSI > 50, volume spike
/// - Short: the mirror image on the lower band
///
/// Only evaluated while flat. Exits are left to the stop and target that
/// ride on the entry order.
#[derive(Debug, Clone)]
pub struct ChannelBreakoutStrategy {
    params: RiskParameters,
    config: SignalConfig,
}

impl ChannelBreakoutStrategy {
    pub fn new(params: RiskParameters, config: SignalConfig) -> Self {
        Self { params, config }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        "ChannelBreakout"
    }

    pub fn min_candles_required(&self) -> usize {
        self.config.required_candles(&self.params)
    }

    pub fn snapshot(&self, candles: &[Candle]) -> Result<MarketSnapshot> {
        MarketSnapshot::from_candles(candles, &self.params, &self.config)
    }

    /// Entry signal for this snapshot given the live position
    pub fn generate_signal(&self, snapshot: &MarketSnapshot, position: &PositionState) -> Signal {
        // One position at a time
        if !position.is_flat() {
            return Signal::Hold;
        }

        // Long is checked first if both ever hold at once
        if self.is_long_breakout(snapshot) {
            Signal::Long
        } else if self.is_short_breakout(snapshot) {
            Signal::Short
        } else {
            Signal::Hold
        }
    }

    fn is_long_breakout(&self, s: &MarketSnapshot) -> bool {
        s.prev_close <= s.prev_channel.upper
            && s.close > s.channel.upper
            && s.channel.slope > 0.0
            && s.rsi > 50.0
            && s.volume_confirms(self.config.volume_multiplier)
    }

    fn is_short_breakout(&self, s: &MarketSnapshot) -> bool {
        s.prev_close >= s.prev_channel.lower
            && s.close < s.channel.lower
            && s.channel.slope < 0.0
            && s.rsi < 50.0
            && s.volume_confirms(self.config.volume_multiplier)
    }

    /// Stop and target for an entry at the snapshot close
    ///
    /// The stop sits half an ATR (by default) beyond the opposite band; the
    /// target is `reward_ratio` times the stop distance on the other side.
    /// Returns `(stop_loss, take_profit)`.
    pub fn exit_levels(&self, side: Side, s: &MarketSnapshot) -> (f64, f64) {
        let buffer = self.config.stop_atr_buffer * s.atr;
        match side {
            Side::Long => {
                let stop = s.channel.lower - buffer;
                let target = s.close + self.params.reward_ratio * (s.close - stop);
                (stop, target)
            }
            Side::Short => {
                let stop = s.channel.upper + buffer;
                let target = s.close - self.params.reward_ratio * (stop - s.close);
                (stop, target)
            }
        }
    }
}
