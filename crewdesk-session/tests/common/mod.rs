//! Common fixtures for session lifecycle tests
#![allow(dead_code)]

use async_trait::async_trait;
use crewdesk_session::backend::{
    AuthChange, BackendError, BackendResult, Session, StorageEvent,
};
use crewdesk_session::logging::{LogFormat, LoggingConfig};
use crewdesk_session::{
    AuthSnapshot, IdentityBackend, MemoryIdentityBackend, MemoryProfileSource, Profile, Role,
    SessionHandle,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::broadcast;

pub const AGENT_ID: &str = "u-ana";
pub const AGENT_EMAIL: &str = "ana@crewdesk.test";
pub const AGENT_PASSWORD: &str = "hunter2";

pub const ADMIN_ID: &str = "u-iris";
pub const ADMIN_EMAIL: &str = "iris@crewdesk.test";
pub const ADMIN_PASSWORD: &str = "s3cret";

static INIT: Once = Once::new();

/// Initialize logging once per test binary
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = crewdesk_session::logging::init_logging(&LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_thread: false,
        });
    });
}

pub fn agent_profile() -> Profile {
    Profile::new(AGENT_ID, AGENT_EMAIL, Role::Agent).with_full_name("Ana Ferreira")
}

pub fn admin_profile() -> Profile {
    Profile::new(ADMIN_ID, ADMIN_EMAIL, Role::Admin).with_full_name("Iris Chen")
}

/// Backend with the two standard test accounts
pub fn backend_with_agents() -> MemoryIdentityBackend {
    MemoryIdentityBackend::new()
        .with_account(AGENT_ID, AGENT_EMAIL, AGENT_PASSWORD)
        .with_account(ADMIN_ID, ADMIN_EMAIL, ADMIN_PASSWORD)
}

/// Profile source holding rows for both standard accounts
pub fn profiles_for_agents() -> MemoryProfileSource {
    MemoryProfileSource::new()
        .with_profile(agent_profile())
        .with_profile(admin_profile())
}

/// Wait until the lifecycle publishes a snapshot matching the predicate
pub async fn wait_for_snapshot<F>(handle: &SessionHandle, predicate: F) -> AuthSnapshot
where
    F: Fn(&AuthSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut rx = handle.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if predicate(&snapshot) {
                return snapshot;
            }
            rx.changed().await.expect("lifecycle ended while waiting");
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}

/// Delegating backend that counts calls and can fail session lookups
pub struct CountingBackend {
    inner: Arc<MemoryIdentityBackend>,
    session_lookups: AtomicUsize,
    refreshes: AtomicUsize,
    sign_outs: AtomicUsize,
    fail_session_lookups: AtomicBool,
}

impl CountingBackend {
    pub fn new(inner: Arc<MemoryIdentityBackend>) -> Self {
        Self {
            inner,
            session_lookups: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
            fail_session_lookups: AtomicBool::new(false),
        }
    }

    pub fn session_lookups(&self) -> usize {
        self.session_lookups.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    pub fn set_fail_session_lookups(&self, fail: bool) {
        self.fail_session_lookups.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityBackend for CountingBackend {
    async fn get_session(&self) -> BackendResult<Option<Session>> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_session_lookups.load(Ordering::SeqCst) {
            return Err(BackendError::network("injected session lookup failure"));
        }
        self.inner.get_session().await
    }

    async fn refresh_session(&self) -> BackendResult<Option<Session>> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.inner.refresh_session().await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<()> {
        self.inner.sign_in_with_password(email, password).await
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_out().await
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.inner.subscribe_changes()
    }

    fn subscribe_storage(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.subscribe_storage()
    }

    fn session_storage_key(&self) -> &str {
        self.inner.session_storage_key()
    }
}
