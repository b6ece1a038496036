/// Calculate Relative Strength Index (RSI) with Wilder's smoothing
///
/// RSI measures the magnitude of recent price changes to evaluate
/// momentum. The first average gain/loss is a simple mean over the first
/// `period` changes; every later change is folded in with
/// `avg = (avg * (period - 1) + x) / period`.
///
/// Values:
/// - RSI > 50: gains dominate
/// - RSI < 50: losses dominate
///
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);

    // Calculate price changes
    for window in prices.windows(2) {
        let change = window[1] - window[0];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let period_f = period as f64;
    let mut avg_gain: f64 = gains.iter().take(period).sum::<f64>() / period_f;
    let mut avg_loss: f64 = losses.iter().take(period).sum::<f64>() / period_f;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period_f - 1.0) + gains[i]) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + losses[i]) / period_f;
    }

    if avg_loss == 0.0 {
        // Flat series: neither side has momentum
        if avg_gain == 0.0 {
            return Some(50.0);
        }
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - (100.0 / (1.0 + rs));

    if rsi.is_finite() {
        Some(rsi)
    } else {
        None
    }
}
