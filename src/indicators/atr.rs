//! Average True Range (ATR) indicator
//!
//! Measures market volatility by calculating the average of true ranges over a period.
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! Uses Wilder's smoothing (same as RSI) for the moving average.

use crate::models::Candle;

/// Calculate ATR for the given candles
///
/// Returns the current ATR value, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|pair| true_range(&pair[1], pair[0].close))
        .collect();

    // First ATR is simple average of first 'period' true ranges
    let period_f = period as f64;
    let mut atr: f64 = true_ranges.iter().take(period).sum::<f64>() / period_f;

    // Apply Wilder's smoothing for subsequent values
    for tr in &true_ranges[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
    }

    if atr.is_finite() {
        Some(atr)
    } else {
        None
    }
}

fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    (candle.high - candle.low)
        .max((candle.high - prev_close).abs())
        .max((candle.low - prev_close).abs())
}
