// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{Exchange, Notifier};
pub use error::{BotError, Stage};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
