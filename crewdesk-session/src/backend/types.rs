//! Identity backend data types
//!
//! Types exchanged with the backend identity provider: sessions, the users
//! they belong to, the auth-change stream payloads, and storage notifications.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by the identity backend boundary
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Backend rejected the request: {message}")]
    Rejected { message: String },
}

impl BackendError {
    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a rejection error
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Whether this error means the grant itself is unusable, as opposed to a
    /// transient failure that may succeed on retry
    pub fn is_invalid_grant(&self) -> bool {
        matches!(
            self,
            BackendError::InvalidCredentials | BackendError::InvalidRefreshToken
        )
    }
}

/// Minimal identity record issued by the backend alongside a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable user identifier
    pub id: String,
    /// Primary email address
    pub email: String,
}

/// One authenticated grant from the backend
///
/// Immutable once issued; a refresh supersedes it with a new `Session` rather
/// than mutating it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque access token
    pub access_token: String,
    /// Opaque refresh token
    pub refresh_token: String,
    /// Absolute expiry, seconds since epoch
    pub expires_at: i64,
    /// Owning user
    pub user: AuthUser,
}

impl Session {
    /// Check whether the session expires within the given window from now
    pub fn expires_within(&self, window: Duration) -> bool {
        let remaining = self.expires_at - Utc::now().timestamp();
        remaining <= window.as_secs() as i64
    }

    /// Check whether the session has already expired
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }
}

/// Kind of auth-change notification pushed by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthEventKind {
    /// A sign-in completed
    SignedIn,
    /// The session was terminated
    SignedOut,
    /// The access/refresh token pair was rotated
    TokenRefreshed,
    /// The user record changed (email, metadata, ...)
    UserUpdated,
    /// Bare "a session is present" tick with no other change
    SessionPresent,
}

impl std::fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthEventKind::SignedIn => write!(f, "signed_in"),
            AuthEventKind::SignedOut => write!(f, "signed_out"),
            AuthEventKind::TokenRefreshed => write!(f, "token_refreshed"),
            AuthEventKind::UserUpdated => write!(f, "user_updated"),
            AuthEventKind::SessionPresent => write!(f, "session_present"),
        }
    }
}

/// One notification on the backend's auth-change stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthChange {
    pub kind: AuthEventKind,
    /// Accompanying session, when one exists after the change
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

/// Cross-tab notification that a persisted storage entry changed
///
/// `new_value: None` means the entry was removed by another tab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}
