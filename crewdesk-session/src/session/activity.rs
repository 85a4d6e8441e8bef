//! Activity Tracking
//!
//! Records the moment of the user's last interaction so the liveness monitor
//! can avoid refreshing sessions for idle or abandoned tabs. The embedding UI
//! wires its pointer/key/scroll listeners to [`ActivityTracker::touch`]; each
//! call unconditionally overwrites the timestamp, which is all that
//! last-write-wins correctness needs. The timestamp is never persisted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Kind of user interaction observed by the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Pointer,
    Click,
    Key,
    Scroll,
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionKind::Pointer => write!(f, "pointer"),
            InteractionKind::Click => write!(f, "click"),
            InteractionKind::Key => write!(f, "key"),
            InteractionKind::Scroll => write!(f, "scroll"),
        }
    }
}

/// Cloneable handle recording the last observed user interaction
///
/// Creation counts as the first interaction; a freshly mounted subsystem is
/// not an idle one.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    started: Instant,
    last_ms: Arc<AtomicU64>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record an interaction happening now
    pub fn touch(&self, kind: InteractionKind) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        trace!(kind = %kind, elapsed_ms, "user interaction observed");
        self.last_ms.store(elapsed_ms, Ordering::Relaxed);
    }

    /// Milliseconds between subsystem start and the last interaction
    pub fn last_activity_ms(&self) -> u64 {
        self.last_ms.load(Ordering::Relaxed)
    }

    /// Time elapsed since the last interaction
    pub fn idle_duration(&self) -> Duration {
        let now_ms = self.started.elapsed().as_millis() as u64;
        Duration::from_millis(now_ms.saturating_sub(self.last_activity_ms()))
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}
