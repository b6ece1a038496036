// Cycle orchestration and scheduling
pub mod engine;
pub mod scheduler;

pub use engine::{CycleOutcome, Decision, SignalEngine};
pub use scheduler::Scheduler;
