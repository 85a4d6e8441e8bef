//! Liveness Monitor
//!
//! Periodic timer that exists only while a session is held. Each tick is
//! enqueued as a [`LifecycleCommand::LivenessTick`] so the refresh decision
//! itself runs inside the reconciler, serialized with every other mutation.

use super::reconciler::LifecycleCommand;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Owner of the periodic tick task
///
/// `start` while running and `stop` while stopped are both no-ops, so the
/// reconciler can call them from any transition without bookkeeping.
pub(crate) struct LivenessMonitor {
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl LivenessMonitor {
    pub(crate) fn new(period: Duration) -> Self {
        Self { period, task: None }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start ticking into the command queue; no-op when already running
    pub(crate) fn start(&mut self, commands: mpsc::Sender<LifecycleCommand>) {
        if self.task.is_some() {
            return;
        }

        let period = self.period;
        debug!(period_secs = period.as_secs(), "liveness monitor started");
        self.task = Some(tokio::spawn(async move {
            // First tick after one full period, not immediately
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if commands.send(LifecycleCommand::LivenessTick).await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Cancel the tick task; idempotent
    pub(crate) fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("liveness monitor stopped");
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
