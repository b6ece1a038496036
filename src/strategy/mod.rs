// Trading strategy module
pub mod channel_breakout;
pub mod signals;

pub use channel_breakout::ChannelBreakoutStrategy;
pub use signals::{MarketSnapshot, SignalConfig};
