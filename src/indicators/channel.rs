//! Linear regression channel
//!
//! A least-squares line is fit to the trailing `period` closes against bar
//! index. The centerline is that line evaluated at the last bar, and the
//! bands sit `multiplier` sample standard deviations of close above and
//! below it.

use serde::{Deserialize, Serialize};

/// Channel values at the most recent bar of the window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChannelSnapshot {
    pub centerline: f64,
    pub upper: f64,
    pub lower: f64,
    pub slope: f64,
}

/// Least-squares fit of the trailing window, evaluated at its last bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearRegression {
    pub value: f64,
    pub slope: f64,
}

pub fn linear_regression(values: &[f64], period: usize) -> Option<LinearRegression> {
    if period < 2 || values.len() < period {
        return None;
    }

    let window = &values[values.len() - period..];
    let n = period as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (i, &y) in window.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    let value = intercept + slope * (n - 1.0);

    if value.is_finite() && slope.is_finite() {
        Some(LinearRegression { value, slope })
    } else {
        None
    }
}

/// Sample standard deviation (n - 1 denominator) of the trailing window
pub fn sample_std_dev(values: &[f64], period: usize) -> Option<f64> {
    if period < 2 || values.len() < period {
        return None;
    }

    let window = &values[values.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
    let std_dev = variance.sqrt();

    if std_dev.is_finite() {
        Some(std_dev)
    } else {
        None
    }
}

/// Regression channel over the trailing `period` closes
pub fn calculate_channel(closes: &[f64], period: usize, multiplier: f64) -> Option<ChannelSnapshot> {
    if multiplier.is_nan() || multiplier <= 0.0 {
        return None;
    }

    let regression = linear_regression(closes, period)?;
    let deviation = sample_std_dev(closes, period)?;
    let width = multiplier * deviation;

    Some(ChannelSnapshot {
        centerline: regression.value,
        upper: regression.value + width,
        lower: regression.value - width,
        slope: regression.slope,
    })
}
