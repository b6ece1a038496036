use std::fmt;

use thiserror::Error;

/// External call a failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchCandles,
    FetchPosition,
    FetchEquity,
    FetchLastPrice,
    SubmitOrder,
    Notify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FetchCandles => "fetch_candles",
            Stage::FetchPosition => "fetch_position",
            Stage::FetchEquity => "fetch_equity",
            Stage::FetchLastPrice => "fetch_last_price",
            Stage::SubmitOrder => "submit_order",
            Stage::Notify => "notify",
        };
        f.write_str(name)
    }
}

/// Error taxonomy for a trading cycle
///
/// - `InsufficientData`: the cycle is skipped quietly
/// - `ExternalService` / `InvalidComputation`: the cycle aborts and the
///   scheduler cools down
/// - `Notification`: logged by the caller, never escalated
/// - `Config`: startup only
#[derive(Debug, Error)]
pub enum BotError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("{stage} failed: {message}")]
    ExternalService { stage: Stage, message: String },

    #[error("invalid computation: {0}")]
    InvalidComputation(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BotError {
    pub fn external(stage: Stage, err: impl fmt::Display) -> Self {
        BotError::ExternalService {
            stage,
            message: err.to_string(),
        }
    }

    pub fn timeout(stage: Stage, limit: std::time::Duration) -> Self {
        BotError::ExternalService {
            stage,
            message: format!("timed out after {:?}", limit),
        }
    }

    /// Whether this error means "nothing to do this cycle" rather than a failure
    pub fn is_skip(&self) -> bool {
        matches!(self, BotError::InsufficientData(_))
    }

    /// Stage of the external call, if this came from one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            BotError::ExternalService { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        BotError::Config(err.to_string())
    }
}
