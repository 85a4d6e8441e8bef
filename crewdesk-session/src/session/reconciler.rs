//! Auth Event Reconciler
//!
//! Single writer to the session store. Backend auth events, liveness timer
//! ticks, cross-tab storage notifications and user-initiated calls are all
//! producers into one command queue consumed here, so mutations are
//! serialized in arrival order.

use super::activity::ActivityTracker;
use super::crosstab::CrossTabSynchronizer;
use super::liveness::LivenessMonitor;
use super::store::{AuthPhase, AuthSnapshot, SessionStore};
use crate::backend::{AuthChange, AuthEventKind, IdentityBackend, Session};
use crate::profile::{Profile, ProfileLoader, ProfileSource};
use crate::{AuthError, AuthResult, LifecycleConfig};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Messages consumed by the reconciler loop
pub(crate) enum LifecycleCommand {
    SignIn {
        email: String,
        password: String,
        respond: oneshot::Sender<AuthResult<()>>,
    },
    SignOut {
        respond: oneshot::Sender<AuthResult<()>>,
    },
    RefreshProfile {
        respond: oneshot::Sender<AuthResult<()>>,
    },
    AuthChanged(AuthChange),
    LivenessTick,
    StorageCleared,
    ProfileLoaded {
        user_id: String,
        profile: Option<Profile>,
    },
    Shutdown {
        respond: oneshot::Sender<()>,
    },
}

/// Whether adopting a session should trigger a profile fetch
enum ProfileFetch {
    /// Fetch unconditionally (user attributes may have changed)
    Always,
    /// Fetch only when no matching profile is already held
    IfMissing,
}

/// Handle to a running session lifecycle
///
/// The one authoritative instance per application is constructed explicitly
/// with [`SessionHandle::spawn`] and passed to whatever mounts the UI tree;
/// consumers hold clones of the handle or of its watch receiver.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<LifecycleCommand>,
    snapshot: watch::Receiver<AuthSnapshot>,
    activity: ActivityTracker,
}

impl SessionHandle {
    /// Start the lifecycle against a backend and a profile source
    pub fn spawn(
        backend: Arc<dyn IdentityBackend>,
        profiles: Arc<dyn ProfileSource>,
        config: LifecycleConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer);
        let (store, snapshot_rx) = SessionStore::new();
        let activity = ActivityTracker::new();

        let crosstab = CrossTabSynchronizer::start(
            backend.subscribe_storage(),
            backend.session_storage_key().to_string(),
            commands_tx.clone(),
        );
        let auth_forwarder = spawn_auth_forwarder(backend.subscribe_changes(), commands_tx.clone());

        let reconciler = Reconciler {
            backend,
            profiles: ProfileLoader::new(profiles),
            store,
            activity: activity.clone(),
            liveness: LivenessMonitor::new(config.liveness_interval()),
            crosstab,
            auth_forwarder,
            commands: commands_tx.clone(),
            config,
        };
        tokio::spawn(reconciler.run(commands_rx));

        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            activity,
        }
    }

    /// Current state, read without waiting
    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.clone()
    }

    /// Activity handle for the UI layer's interaction listeners
    pub fn activity(&self) -> ActivityTracker {
        self.activity.clone()
    }

    /// Wait until startup has resolved to a phase other than `Initializing`
    pub async fn settled(&self) -> AuthResult<AuthSnapshot> {
        let mut rx = self.snapshot.clone();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.phase != AuthPhase::Initializing {
                return Ok(snapshot);
            }
            rx.changed().await.map_err(|_| AuthError::LifecycleClosed)?;
        }
    }

    /// Authenticate with email and password; failures are returned to the
    /// caller and leave the current phase untouched
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<()> {
        let email = email.to_string();
        let password = password.to_string();
        self.request(|respond| LifecycleCommand::SignIn {
            email,
            password,
            respond,
        })
        .await
    }

    /// Terminate the current session
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.request(|respond| LifecycleCommand::SignOut { respond })
            .await
    }

    /// Re-run the profile lookup for the current user on demand
    pub async fn refresh_profile(&self) -> AuthResult<()> {
        self.request(|respond| LifecycleCommand::RefreshProfile { respond })
            .await
    }

    /// Stop the reconciler and all of its background tasks
    pub async fn shutdown(&self) -> AuthResult<()> {
        let (respond, done) = oneshot::channel();
        self.commands
            .send(LifecycleCommand::Shutdown { respond })
            .await
            .map_err(|_| AuthError::LifecycleClosed)?;
        done.await.map_err(|_| AuthError::LifecycleClosed)
    }

    async fn request<F>(&self, command: F) -> AuthResult<()>
    where
        F: FnOnce(oneshot::Sender<AuthResult<()>>) -> LifecycleCommand,
    {
        let (respond, result) = oneshot::channel();
        self.commands
            .send(command(respond))
            .await
            .map_err(|_| AuthError::LifecycleClosed)?;
        result.await.map_err(|_| AuthError::LifecycleClosed)?
    }
}

fn spawn_auth_forwarder(
    mut events: broadcast::Receiver<AuthChange>,
    commands: mpsc::Sender<LifecycleCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(change) => {
                    if commands
                        .send(LifecycleCommand::AuthChanged(change))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

struct Reconciler {
    backend: Arc<dyn IdentityBackend>,
    profiles: ProfileLoader,
    store: SessionStore,
    activity: ActivityTracker,
    liveness: LivenessMonitor,
    crosstab: CrossTabSynchronizer,
    auth_forwarder: JoinHandle<()>,
    commands: mpsc::Sender<LifecycleCommand>,
    config: LifecycleConfig,
}

impl Reconciler {
    async fn run(mut self, mut commands: mpsc::Receiver<LifecycleCommand>) {
        self.initialize().await;

        while let Some(command) = commands.recv().await {
            match command {
                LifecycleCommand::SignIn {
                    email,
                    password,
                    respond,
                } => {
                    let result = self.handle_sign_in(&email, &password).await;
                    let _ = respond.send(result);
                }
                LifecycleCommand::SignOut { respond } => {
                    let result = self.handle_sign_out().await;
                    let _ = respond.send(result);
                }
                LifecycleCommand::RefreshProfile { respond } => {
                    let result = self.handle_refresh_profile().await;
                    let _ = respond.send(result);
                }
                LifecycleCommand::AuthChanged(change) => self.handle_auth_change(change),
                LifecycleCommand::LivenessTick => self.handle_liveness_tick().await,
                LifecycleCommand::StorageCleared => self.handle_storage_cleared(),
                LifecycleCommand::ProfileLoaded { user_id, profile } => {
                    self.handle_profile_loaded(user_id, profile)
                }
                LifecycleCommand::Shutdown { respond } => {
                    self.teardown();
                    let _ = respond.send(());
                    break;
                }
            }
        }

        debug!("session lifecycle loop ended");
    }

    /// Resolve the `Initializing` phase exactly once; every outcome,
    /// including a failed lookup, terminates in one of the two settled phases
    async fn initialize(&mut self) {
        match self.backend.get_session().await {
            Ok(Some(session)) => {
                info!(user_id = %session.user.id, "restored persisted session");
                self.adopt_session(session, ProfileFetch::Always);
            }
            Ok(None) => {
                info!("no persisted session, starting unauthenticated");
                self.store.clear();
            }
            Err(err) => {
                warn!(error = %err, "session lookup failed during startup");
                self.store.clear();
            }
        }
    }

    async fn handle_sign_in(&mut self, email: &str, password: &str) -> AuthResult<()> {
        self.backend
            .sign_in_with_password(email, password)
            .await
            .map_err(|source| {
                warn!(error = %source, "sign-in failed");
                AuthError::SignIn { source }
            })?;

        match self.backend.get_session().await {
            Ok(Some(session)) => {
                info!(user_id = %session.user.id, "signed in");
                self.adopt_session(session, ProfileFetch::IfMissing);
            }
            Ok(None) => warn!("sign-in succeeded but no session is available yet"),
            Err(err) => warn!(error = %err, "session lookup failed after sign-in"),
        }
        Ok(())
    }

    async fn handle_sign_out(&mut self) -> AuthResult<()> {
        self.backend.sign_out().await.map_err(|source| {
            warn!(error = %source, "sign-out failed");
            AuthError::SignOut { source }
        })?;

        self.clear_session("user signed out");
        Ok(())
    }

    async fn handle_refresh_profile(&mut self) -> AuthResult<()> {
        let Some(user_id) = self.store.user_id() else {
            return Err(AuthError::session(
                "no authenticated user to refresh a profile for",
            ));
        };

        // Awaited inline: no other command runs while this lookup is pending,
        // so the user cannot change under it
        let profile = self.profiles.load_profile(&user_id).await;
        self.store.set_profile(profile);
        Ok(())
    }

    fn handle_auth_change(&mut self, change: AuthChange) {
        debug!(
            kind = %change.kind,
            has_session = change.session.is_some(),
            "auth event received"
        );

        match change.kind {
            AuthEventKind::SignedOut => self.clear_session("backend reported sign-out"),
            AuthEventKind::UserUpdated => match change.session {
                // User attributes may have changed even for the same id, so
                // the profile is always re-fetched
                Some(session) => self.adopt_session(session, ProfileFetch::Always),
                None => debug!("user update without a session ignored"),
            },
            AuthEventKind::SignedIn
            | AuthEventKind::TokenRefreshed
            | AuthEventKind::SessionPresent => match change.session {
                Some(session) => self.adopt_session(session, ProfileFetch::IfMissing),
                None => debug!(kind = %change.kind, "auth event without a session ignored"),
            },
        }
    }

    /// One liveness pass: idle gate first, then a near-expiry refresh
    async fn handle_liveness_tick(&mut self) {
        if self.store.phase() != AuthPhase::Authenticated {
            return;
        }

        let idle = self.activity.idle_duration();
        if idle >= self.config.idle_threshold() {
            debug!(idle_secs = idle.as_secs(), "tab is idle, skipping liveness check");
            return;
        }

        match self.backend.get_session().await {
            Ok(Some(session)) => {
                if !session.expires_within(self.config.refresh_lookahead()) {
                    return;
                }
                match self.backend.refresh_session().await {
                    Ok(Some(fresh)) => {
                        info!(
                            user_id = %fresh.user.id,
                            expires_at = fresh.expires_at,
                            "session refreshed ahead of expiry"
                        );
                        self.adopt_session(fresh, ProfileFetch::IfMissing);
                    }
                    Ok(None) => self.clear_session("refresh produced no session"),
                    Err(err) => {
                        warn!(error = %err, hard = err.is_invalid_grant(), "session refresh failed");
                        self.clear_session("session refresh failed");
                    }
                }
            }
            Ok(None) => self.clear_session("backend no longer holds a session"),
            Err(err) => {
                warn!(error = %err, "session check failed");
                self.clear_session("session check failed");
            }
        }
    }

    fn handle_storage_cleared(&mut self) {
        if self.store.phase() != AuthPhase::Authenticated {
            debug!("storage cleared while not authenticated, nothing to do");
            return;
        }
        // The originating tab already called sign_out; only local state moves
        self.clear_session("session storage cleared in another tab");
    }

    fn handle_profile_loaded(&mut self, user_id: String, profile: Option<Profile>) {
        match self.store.user_id() {
            Some(current) if current == user_id => {
                debug!(user_id = %user_id, found = profile.is_some(), "profile fetch resolved");
                self.store.set_profile(profile);
            }
            _ => debug!(user_id = %user_id, "discarding stale profile fetch"),
        }
    }

    /// Atomically install a session and its user, keep the liveness monitor
    /// running, and fetch the profile as the policy dictates
    fn adopt_session(&mut self, session: Session, fetch: ProfileFetch) {
        let user = session.user.clone();
        self.store.set_authenticated(user.clone(), session);
        self.liveness.start(self.commands.clone());

        let need_profile = match fetch {
            ProfileFetch::Always => true,
            // A stale profile was already dropped by the store if the user
            // changed, so "missing" covers both first load and user switch
            ProfileFetch::IfMissing => self.store.snapshot().profile.is_none(),
        };
        if need_profile {
            self.spawn_profile_fetch(user.id);
        }
    }

    /// Fetch a profile off the loop; the result re-enters the queue and is
    /// discarded there if the user has changed by the time it resolves
    fn spawn_profile_fetch(&self, user_id: String) {
        let loader = self.profiles.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let profile = loader.load_profile(&user_id).await;
            let _ = commands
                .send(LifecycleCommand::ProfileLoaded { user_id, profile })
                .await;
        });
    }

    fn clear_session(&mut self, reason: &str) {
        if self.store.phase() != AuthPhase::Unauthenticated {
            info!(reason, "clearing session");
        }
        self.store.clear();
        self.liveness.stop();
    }

    fn teardown(&mut self) {
        self.liveness.stop();
        self.crosstab.stop();
        self.auth_forwarder.abort();
        debug!("session lifecycle shut down");
    }
}
