use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::indicators::{calculate_atr, calculate_channel, calculate_rsi, calculate_sma, ChannelSnapshot};
use crate::models::Candle;
use crate::risk::RiskParameters;
use crate::Result;

/// Fixed signal-rule constants
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalConfig {
    pub atr_period: usize,
    pub volume_period: usize,    // Trailing bars in the average volume
    pub volume_multiplier: f64,  // Current volume must exceed this multiple of the average
    pub stop_atr_buffer: f64,    // ATR multiples placed beyond the opposite band for the stop
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            volume_period: 20,
            volume_multiplier: 1.2,
            stop_atr_buffer: 0.5,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.atr_period == 0 || self.volume_period == 0 {
            return Err(BotError::Config(format!(
                "atr_period and volume_period must be positive (got {} and {})",
                self.atr_period, self.volume_period
            )));
        }
        if !(self.volume_multiplier > 0.0 && self.volume_multiplier.is_finite()) {
            return Err(BotError::Config(format!(
                "volume_multiplier must be positive, got {}",
                self.volume_multiplier
            )));
        }
        if !(self.stop_atr_buffer >= 0.0 && self.stop_atr_buffer.is_finite()) {
            return Err(BotError::Config(format!(
                "stop_atr_buffer must be non-negative, got {}",
                self.stop_atr_buffer
            )));
        }
        Ok(())
    }

    /// Bars needed before any indicator can be evaluated
    ///
    /// The channel is also needed one bar back, so it takes `period + 1`.
    pub fn required_candles(&self, params: &RiskParameters) -> usize {
        (params.channel_period + 1)
            .max(params.rsi_period + 1)
            .max(self.atr_period + 1)
            .max(self.volume_period)
    }
}

/// Everything the entry rules look at, computed fresh from one candle window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub prev_close: f64,
    pub close: f64,
    pub prev_channel: ChannelSnapshot,
    pub channel: ChannelSnapshot,
    pub rsi: f64,
    pub atr: f64,
    pub volume: f64,
    pub avg_volume: f64,
}

impl MarketSnapshot {
    /// Compute the snapshot at the most recent candle
    ///
    /// Returns `InsufficientData` when the window is shorter than the longest
    /// lookback, and `InvalidComputation` when the data yields a non-finite
    /// indicator or a channel with misordered bands.
    pub fn from_candles(
        candles: &[Candle],
        params: &RiskParameters,
        config: &SignalConfig,
    ) -> Result<Self> {
        let required = config.required_candles(params);
        if candles.len() < required {
            return Err(BotError::InsufficientData(format!(
                "{} candles, need {}",
                candles.len(),
                required
            )));
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let last = closes.len() - 1;

        let channel = calculate_channel(&closes, params.channel_period, params.deviation_multiplier)
            .ok_or_else(|| BotError::InvalidComputation("channel at current bar".to_string()))?;
        let prev_channel = calculate_channel(
            &closes[..last],
            params.channel_period,
            params.deviation_multiplier,
        )
        .ok_or_else(|| BotError::InvalidComputation("channel at previous bar".to_string()))?;
        check_bands(&channel)?;
        check_bands(&prev_channel)?;

        let rsi = calculate_rsi(&closes, params.rsi_period)
            .ok_or_else(|| BotError::InvalidComputation("RSI".to_string()))?;
        let atr = calculate_atr(candles, config.atr_period)
            .ok_or_else(|| BotError::InvalidComputation("ATR".to_string()))?;
        let avg_volume = calculate_sma(&volumes, config.volume_period)
            .filter(|v| v.is_finite())
            .ok_or_else(|| BotError::InvalidComputation("average volume".to_string()))?;

        // `last` is the newest kline as served, still forming on a live feed
        let snapshot = Self {
            prev_close: closes[last - 1],
            close: closes[last],
            prev_channel,
            channel,
            rsi,
            atr,
            volume: volumes[last],
            avg_volume,
        };

        if !(snapshot.close.is_finite() && snapshot.prev_close.is_finite() && snapshot.volume.is_finite()) {
            return Err(BotError::InvalidComputation(format!(
                "non-finite latest bar: close={} prev_close={} volume={}",
                snapshot.close, snapshot.prev_close, snapshot.volume
            )));
        }

        Ok(snapshot)
    }

    /// Current volume is above `multiplier` times the trailing average
    pub fn volume_confirms(&self, multiplier: f64) -> bool {
        self.volume > self.avg_volume * multiplier
    }
}

fn check_bands(channel: &ChannelSnapshot) -> Result<()> {
    if channel.upper >= channel.centerline && channel.centerline >= channel.lower {
        Ok(())
    } else {
        Err(BotError::InvalidComputation(format!(
            "channel bands out of order: upper={} center={} lower={}",
            channel.upper, channel.centerline, channel.lower
        )))
    }
}
