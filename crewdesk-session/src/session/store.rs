//! Session Store
//!
//! Pure state container for the `{phase, user, profile, session}` tuple.
//! The store performs no I/O and no validation; the reconciler is its only
//! writer, and consumers observe it through a watch channel that notifies on
//! every change.

use crate::backend::{AuthUser, Session};
use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Externally observable lifecycle state of the subsystem
///
/// `Initializing` is the only startup state and always resolves to one of the
/// other two; `Authenticated` can fall back to `Unauthenticated` (sign-out,
/// forced cross-tab logout, unrecoverable refresh failure) but never the
/// reverse without a fresh sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Initializing,
    Authenticated,
    Unauthenticated,
}

impl std::fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthPhase::Initializing => write!(f, "initializing"),
            AuthPhase::Authenticated => write!(f, "authenticated"),
            AuthPhase::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}

/// Read-only view of the current session state
#[derive(Debug, Clone)]
pub struct AuthSnapshot {
    pub phase: AuthPhase,
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub session: Option<Session>,
}

impl AuthSnapshot {
    fn initializing() -> Self {
        Self {
            phase: AuthPhase::Initializing,
            user: None,
            profile: None,
            session: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

/// Single-writer state container backed by a watch channel
pub(crate) struct SessionStore {
    tx: watch::Sender<AuthSnapshot>,
}

impl SessionStore {
    /// Create a store in the `Initializing` phase and a receiver for consumers
    pub(crate) fn new() -> (Self, watch::Receiver<AuthSnapshot>) {
        let (tx, rx) = watch::channel(AuthSnapshot::initializing());
        (Self { tx }, rx)
    }

    pub(crate) fn phase(&self) -> AuthPhase {
        self.tx.borrow().phase
    }

    pub(crate) fn snapshot(&self) -> AuthSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn user_id(&self) -> Option<String> {
        self.tx.borrow().user_id().map(|id| id.to_string())
    }

    /// Replace user and session atomically and enter `Authenticated`
    ///
    /// The held profile survives only if it belongs to the same user id; a
    /// profile for a different user is dropped so the two can never disagree.
    pub(crate) fn set_authenticated(&self, user: AuthUser, session: Session) {
        self.tx.send_modify(|state| {
            let same_user = state.user.as_ref().is_some_and(|u| u.id == user.id);
            if !same_user {
                state.profile = None;
            }
            state.user = Some(user);
            state.session = Some(session);
            state.phase = AuthPhase::Authenticated;
        });
    }

    /// Replace the held profile
    pub(crate) fn set_profile(&self, profile: Option<Profile>) {
        self.tx.send_modify(|state| {
            state.profile = profile;
        });
    }

    /// Clear everything and enter `Unauthenticated`
    pub(crate) fn clear(&self) {
        self.tx.send_modify(|state| {
            state.phase = AuthPhase::Unauthenticated;
            state.user = None;
            state.profile = None;
            state.session = None;
        });
    }
}
