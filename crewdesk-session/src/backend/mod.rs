//! Identity Backend Boundary
//!
//! The session lifecycle treats the backend identity provider as an opaque
//! collaborator: it issues sessions, persists one of them under a well-known
//! storage key, and pushes auth-change notifications. Everything this crate
//! needs from it is captured by the [`IdentityBackend`] trait; the provider's
//! own protocol, token format and storage encryption stay on its side of the
//! boundary.

pub mod memory;
pub mod types;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use memory::MemoryIdentityBackend;
pub use types::{
    AuthChange, AuthEventKind, AuthUser, BackendError, BackendResult, Session, StorageEvent,
};

/// Client interface to the backend identity provider
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Return the currently persisted session, if any
    async fn get_session(&self) -> BackendResult<Option<Session>>;

    /// Exchange the current refresh token for a new session
    async fn refresh_session(&self) -> BackendResult<Option<Session>>;

    /// Authenticate with email and password
    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<()>;

    /// Terminate the current session
    async fn sign_out(&self) -> BackendResult<()>;

    /// Subscribe to the backend's auth-change stream
    fn subscribe_changes(&self) -> broadcast::Receiver<AuthChange>;

    /// Subscribe to cross-tab storage notifications
    fn subscribe_storage(&self) -> broadcast::Receiver<StorageEvent>;

    /// Storage key under which the backend persists its session; removal of
    /// this key by another tab signals "logged out elsewhere"
    fn session_storage_key(&self) -> &str;
}
