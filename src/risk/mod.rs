// Risk management module
pub mod parameters;
pub mod sizer;

pub use parameters::RiskParameters;
pub use sizer::RiskSizer;
