use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::BotError;
use crate::execution::Scheduler;
use crate::models::InstrumentSpec;
use crate::risk::{RiskParameters, RiskSizer};
use crate::strategy::SignalConfig;
use crate::Result;

const ENV_PREFIX: &str = "LRC";
// Bybit serves at most this many klines per request
const MAX_CANDLE_LIMIT: usize = 1000;

/// Process settings, read once at startup from `LRC_*` variables
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub symbol: String,
    pub interval: String,
    pub candle_limit: usize,
    pub testnet: bool,

    // Channel and filters
    pub channel_period: usize,
    pub deviation_multiplier: f64,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub volume_period: usize,
    pub volume_multiplier: f64,

    // Risk
    pub risk_fraction: f64,
    pub reward_ratio: f64,
    pub stop_multiplier: f64,
    pub stop_atr_buffer: f64,
    pub fallback_equity: f64,

    // Instrument increments
    pub qty_step: f64,
    pub price_tick: f64,

    // Timing
    pub cycle_interval_secs: u64,
    pub cooldown_secs: u64,
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        Self::load_from(Environment::with_prefix(ENV_PREFIX))
    }

    /// Load from an explicit set of variables, named as in the environment (`LRC_SYMBOL`)
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        Self::load_from(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn load_from(env: Environment) -> Result<Self> {
        let settings: Settings = Config::builder()
            .set_default("symbol", "SOLUSDT")?
            .set_default("interval", "5")?
            .set_default("candle_limit", 50_i64)?
            .set_default("testnet", false)?
            .set_default("channel_period", 20_i64)?
            .set_default("deviation_multiplier", 2.0)?
            .set_default("rsi_period", 14_i64)?
            .set_default("atr_period", 14_i64)?
            .set_default("volume_period", 20_i64)?
            .set_default("volume_multiplier", 1.2)?
            .set_default("risk_fraction", 0.01)?
            .set_default("reward_ratio", 2.0)?
            .set_default("stop_multiplier", 1.5)?
            .set_default("stop_atr_buffer", 0.5)?
            .set_default("fallback_equity", 1000.0)?
            .set_default("qty_step", 0.001)?
            .set_default("price_tick", 0.01)?
            .set_default("cycle_interval_secs", 30_i64)?
            .set_default("cooldown_secs", 60_i64)?
            .set_default("request_timeout_secs", 10_i64)?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject anything the engine could not run with
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(BotError::Config("symbol must not be empty".to_string()));
        }
        if self.interval.trim().is_empty() {
            return Err(BotError::Config("interval must not be empty".to_string()));
        }
        if self.candle_limit > MAX_CANDLE_LIMIT {
            return Err(BotError::Config(format!(
                "candle_limit {} exceeds the exchange maximum of {}",
                self.candle_limit, MAX_CANDLE_LIMIT
            )));
        }
        if self.cycle_interval_secs == 0 || self.cooldown_secs == 0 || self.request_timeout_secs == 0 {
            return Err(BotError::Config(
                "cycle_interval_secs, cooldown_secs and request_timeout_secs must be positive".to_string(),
            ));
        }

        self.risk_parameters().validate()?;
        self.signal_config().validate()?;
        RiskSizer::new(self.stop_multiplier, self.fallback_equity, self.instrument())?;

        let required = self.signal_config().required_candles(&self.risk_parameters());
        if self.candle_limit < required {
            return Err(BotError::Config(format!(
                "candle_limit {} is below the {} candles the indicators need",
                self.candle_limit, required
            )));
        }
        Ok(())
    }

    pub fn risk_parameters(&self) -> RiskParameters {
        RiskParameters {
            risk_fraction: self.risk_fraction,
            reward_ratio: self.reward_ratio,
            channel_period: self.channel_period,
            deviation_multiplier: self.deviation_multiplier,
            rsi_period: self.rsi_period,
        }
    }

    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            atr_period: self.atr_period,
            volume_period: self.volume_period,
            volume_multiplier: self.volume_multiplier,
            stop_atr_buffer: self.stop_atr_buffer,
        }
    }

    pub fn instrument(&self) -> InstrumentSpec {
        InstrumentSpec {
            qty_step: self.qty_step,
            price_tick: self.price_tick,
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            Duration::from_secs(self.cycle_interval_secs),
            Duration::from_secs(self.cooldown_secs),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Secrets, kept out of `Settings` so they never end up in a debug print
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: required_var("BYBIT_API_KEY")?,
            api_secret: required_var("BYBIT_API_SECRET")?,
            telegram_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(BotError::Config(format!("{} not found in environment", name))),
    }
}
