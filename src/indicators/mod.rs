// Technical indicators module
// Regression channel, RSI, ATR and SMA over plain f64 series

pub mod atr;
pub mod channel;
pub mod moving_average;
pub mod rsi;

pub use atr::calculate_atr;
pub use channel::{calculate_channel, linear_regression, sample_std_dev, ChannelSnapshot};
pub use moving_average::calculate_sma;
pub use rsi::calculate_rsi;
