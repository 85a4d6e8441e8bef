//! In-memory identity backend for tests and simple deployments
//!
//! Mints uuid token pairs with a configurable lifetime, keeps the "persisted"
//! session in memory, and broadcasts the same auth-change and storage
//! notifications a real provider client would.

use super::types::{
    AuthChange, AuthEventKind, AuthUser, BackendError, BackendResult, Session, StorageEvent,
};
use super::IdentityBackend;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Default storage key for the persisted session entry
pub const DEFAULT_SESSION_STORAGE_KEY: &str = "crewdesk.auth.session";

#[derive(Debug, Clone)]
struct Account {
    user: AuthUser,
    password: String,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    current: Option<Session>,
    revoked_refresh_tokens: HashSet<String>,
}

/// In-memory [`IdentityBackend`] implementation
pub struct MemoryIdentityBackend {
    state: Arc<RwLock<MemoryState>>,
    changes: broadcast::Sender<AuthChange>,
    storage: broadcast::Sender<StorageEvent>,
    storage_key: String,
    session_ttl_secs: i64,
}

impl MemoryIdentityBackend {
    /// Create a backend with no accounts and a one-hour session lifetime
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(32);
        let (storage, _) = broadcast::channel(32);

        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            changes,
            storage,
            storage_key: DEFAULT_SESSION_STORAGE_KEY.to_string(),
            session_ttl_secs: 3600,
        }
    }

    /// Register an account that can sign in with the given password
    pub fn with_account(self, user_id: &str, email: &str, password: &str) -> Self {
        {
            let mut state = self
                .state
                .try_write()
                .expect("backend is not shared during construction");
            state.accounts.insert(
                email.to_string(),
                Account {
                    user: AuthUser {
                        id: user_id.to_string(),
                        email: email.to_string(),
                    },
                    password: password.to_string(),
                },
            );
        }
        self
    }

    /// Override the minted session lifetime
    pub fn with_session_ttl(mut self, secs: i64) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    /// Override the storage key used for the persisted session entry
    pub fn with_storage_key<S: Into<String>>(mut self, key: S) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Establish a persisted session for an account without a sign-in call,
    /// as if it survived from a previous run
    pub async fn seed_session(&self, email: &str) -> BackendResult<Session> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get(email)
            .cloned()
            .ok_or_else(|| BackendError::rejected(format!("unknown account: {}", email)))?;

        let session = self.mint(account.user);
        state.current = Some(session.clone());
        self.publish_session(&session);
        Ok(session)
    }

    /// Move the current session's expiry to the given number of seconds from now
    pub async fn expire_current_within(&self, secs: i64) {
        let mut state = self.state.write().await;
        if let Some(session) = state.current.as_mut() {
            session.expires_at = Utc::now().timestamp() + secs;
        }
    }

    /// Mark the current refresh token as revoked; the next refresh attempt
    /// fails with [`BackendError::InvalidRefreshToken`]
    pub async fn revoke_refresh_token(&self) {
        let mut state = self.state.write().await;
        if let Some(token) = state.current.as_ref().map(|s| s.refresh_token.clone()) {
            state.revoked_refresh_tokens.insert(token);
        }
    }

    /// Drop the persisted session silently, as if the backend lost it
    pub async fn drop_current_session(&self) {
        let mut state = self.state.write().await;
        state.current = None;
    }

    /// Simulate a sign-out performed in another tab: the persisted entry is
    /// removed and a storage notification fires, but no auth event does (that
    /// event belongs to the originating tab's client)
    pub async fn simulate_external_sign_out(&self) {
        let mut state = self.state.write().await;
        state.current = None;
        self.publish_removal();
    }

    fn mint(&self, user: AuthUser) -> Session {
        Session {
            access_token: uuid::Uuid::new_v4().to_string(),
            refresh_token: uuid::Uuid::new_v4().to_string(),
            expires_at: Utc::now().timestamp() + self.session_ttl_secs,
            user,
        }
    }

    fn publish_session(&self, session: &Session) {
        let value = serde_json::to_string(session).unwrap_or_default();
        let _ = self.storage.send(StorageEvent {
            key: self.storage_key.clone(),
            new_value: Some(value),
        });
    }

    fn publish_removal(&self) {
        let _ = self.storage.send(StorageEvent {
            key: self.storage_key.clone(),
            new_value: None,
        });
    }
}

impl Default for MemoryIdentityBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityBackend for MemoryIdentityBackend {
    async fn get_session(&self) -> BackendResult<Option<Session>> {
        Ok(self.state.read().await.current.clone())
    }

    async fn refresh_session(&self) -> BackendResult<Option<Session>> {
        let mut state = self.state.write().await;

        let Some(current) = state.current.clone() else {
            return Ok(None);
        };
        if state.revoked_refresh_tokens.contains(&current.refresh_token) {
            return Err(BackendError::InvalidRefreshToken);
        }

        let session = self.mint(current.user);
        state.current = Some(session.clone());
        debug!(user_id = %session.user.id, "rotated session tokens");

        self.publish_session(&session);
        let _ = self.changes.send(AuthChange::new(
            AuthEventKind::TokenRefreshed,
            Some(session.clone()),
        ));
        Ok(Some(session))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<()> {
        let mut state = self.state.write().await;

        let account = state
            .accounts
            .get(email)
            .cloned()
            .ok_or(BackendError::InvalidCredentials)?;
        if account.password != password {
            return Err(BackendError::InvalidCredentials);
        }

        let session = self.mint(account.user);
        state.current = Some(session.clone());
        debug!(user_id = %session.user.id, "password sign-in succeeded");

        self.publish_session(&session);
        let _ = self
            .changes
            .send(AuthChange::new(AuthEventKind::SignedIn, Some(session)));
        Ok(())
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let mut state = self.state.write().await;
        state.current = None;

        self.publish_removal();
        let _ = self
            .changes
            .send(AuthChange::new(AuthEventKind::SignedOut, None));
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }

    fn subscribe_storage(&self) -> broadcast::Receiver<StorageEvent> {
        self.storage.subscribe()
    }

    fn session_storage_key(&self) -> &str {
        &self.storage_key
    }
}
