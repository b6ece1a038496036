use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use super::engine::CycleOutcome;
use crate::Result;

/// Fixed-delay cycle driver
///
/// The delay starts once the previous cycle has finished, so cycles never
/// overlap. A failed or panicking cycle is logged and followed by the
/// cooldown instead of the normal interval; the loop itself never ends.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    interval: Duration,
    cooldown: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration, cooldown: Duration) -> Self {
        Self { interval, cooldown }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Run one cycle and return how long to wait before the next
    pub async fn run_once<F, Fut>(&self, cycle: &mut F) -> Duration
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CycleOutcome>>,
    {
        match AssertUnwindSafe(cycle()).catch_unwind().await {
            Ok(Ok(outcome)) => {
                match &outcome {
                    CycleOutcome::OrderPlaced(confirmation) => {
                        tracing::info!(order_id = %confirmation.order_id, "Cycle placed an order")
                    }
                    CycleOutcome::PositionOpen(side) => {
                        tracing::debug!(side = side.label(), "Cycle done, position open")
                    }
                    CycleOutcome::Skipped(reason) => tracing::debug!(%reason, "Cycle skipped"),
                    CycleOutcome::NoAction => tracing::debug!("Cycle done, no action"),
                }
                self.interval
            }
            Ok(Err(e)) if e.is_skip() => self.interval,
            Ok(Err(e)) => {
                tracing::error!(error = %e, cooldown_secs = self.cooldown.as_secs(), "❌ Cycle failed, cooling down");
                self.cooldown
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(panic = %message, cooldown_secs = self.cooldown.as_secs(), "❌ Cycle panicked, cooling down");
                self.cooldown
            }
        }
    }

    /// Drive cycles forever
    pub async fn run<F, Fut>(&self, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CycleOutcome>>,
    {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            cooldown_secs = self.cooldown.as_secs(),
            "⏰ Scheduler started"
        );

        loop {
            let delay = self.run_once(&mut cycle).await;
            tokio::time::sleep(delay).await;
        }
    }
}
