//! Crewdesk Session - session lifecycle management for the Crewdesk back office
//!
//! The Crewdesk back office is a set of CRUD screens over a managed backend;
//! the one subsystem with real concurrency and state-machine complexity is
//! this crate: establishing, verifying, refreshing and tearing down the
//! authenticated session while reconciling backend auth events, a periodic
//! liveness timer and cross-tab storage notifications into one consistent
//! `{phase, user, profile, session}` view for the rest of the application.
//!
//! ## Architecture
//!
//! - **Backend boundary** ([`backend`]): the opaque identity provider behind
//!   the [`IdentityBackend`] trait, plus an in-memory implementation.
//! - **Profiles** ([`profile`]): best-effort application-level user records
//!   behind the [`ProfileSource`] trait.
//! - **Lifecycle** ([`session`]): the session store, activity tracking,
//!   liveness monitoring, cross-tab synchronization, and the reconciler that
//!   drives them as a single-writer state machine over a command queue.
//!
//! The entry point is [`SessionHandle::spawn`]; everything else reads from
//! its watch channel or feeds triggers into it.

pub mod backend;
pub mod logging;
pub mod profile;
pub mod session;

pub use backend::{
    AuthChange, AuthEventKind, AuthUser, BackendError, BackendResult, IdentityBackend,
    MemoryIdentityBackend, Session, StorageEvent,
};
pub use profile::{MemoryProfileSource, Profile, ProfileLoader, ProfileSource, Role};
pub use session::{
    ActivityTracker, AuthPhase, AuthSnapshot, InteractionKind, SessionHandle,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type AuthResult<T> = Result<T, AuthError>;

/// Errors surfaced by the session lifecycle
///
/// Only user-initiated operations propagate failures upward; everything else
/// the subsystem absorbs, degrading to the unauthenticated phase instead.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Sign-in failed: {source}")]
    SignIn {
        #[source]
        source: BackendError,
    },

    #[error("Sign-out failed: {source}")]
    SignOut {
        #[source]
        source: BackendError,
    },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Session lifecycle is no longer running")]
    LifecycleClosed,
}

impl AuthError {
    /// Create a session error
    pub fn session<S: Into<String>>(message: S) -> Self {
        Self::Session {
            message: message.into(),
        }
    }
}

/// Lifecycle tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Liveness check interval in seconds
    pub liveness_interval_secs: u64,
    /// Idle time after which liveness checks are skipped, in seconds
    pub idle_threshold_secs: u64,
    /// Refresh the session when it expires within this window, in seconds
    pub refresh_lookahead_secs: u64,
    /// Capacity of the internal command queue
    pub command_buffer: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            liveness_interval_secs: 60,
            idle_threshold_secs: 300,
            refresh_lookahead_secs: 300,
            command_buffer: 64,
        }
    }
}

impl LifecycleConfig {
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn refresh_lookahead(&self) -> Duration {
        Duration::from_secs(self.refresh_lookahead_secs)
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::{
        AuthError, AuthPhase, AuthResult, AuthSnapshot, AuthUser, IdentityBackend,
        InteractionKind, LifecycleConfig, Profile, ProfileSource, Role, Session, SessionHandle,
    };
}
