use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::Result;

/// Strategy and risk settings, fixed for the process lifetime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskParameters {
    pub risk_fraction: f64, // Share of equity risked per trade
    pub reward_ratio: f64,  // Target distance as a multiple of stop distance
    pub channel_period: usize,
    pub deviation_multiplier: f64,
    pub rsi_period: usize,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            risk_fraction: 0.01, // 1%
            reward_ratio: 2.0,
            channel_period: 20,
            deviation_multiplier: 2.0,
            rsi_period: 14,
        }
    }
}

impl RiskParameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.risk_fraction > 0.0 && self.risk_fraction < 1.0) {
            return Err(BotError::Config(format!(
                "risk_fraction must be in (0, 1), got {}",
                self.risk_fraction
            )));
        }
        if !(self.reward_ratio > 0.0 && self.reward_ratio.is_finite()) {
            return Err(BotError::Config(format!(
                "reward_ratio must be positive, got {}",
                self.reward_ratio
            )));
        }
        if self.channel_period < 2 {
            return Err(BotError::Config(format!(
                "channel_period must be at least 2, got {}",
                self.channel_period
            )));
        }
        if !(self.deviation_multiplier > 0.0 && self.deviation_multiplier.is_finite()) {
            return Err(BotError::Config(format!(
                "deviation_multiplier must be positive, got {}",
                self.deviation_multiplier
            )));
        }
        if self.rsi_period == 0 {
            return Err(BotError::Config("rsi_period must be positive".to_string()));
        }
        Ok(())
    }
}
