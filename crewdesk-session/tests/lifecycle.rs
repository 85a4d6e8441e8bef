//! Integration tests for the session lifecycle
//!
//! Each test spins up a real reconciler over the in-memory backend and
//! drives it through the user-facing operations.

mod common;

use common::*;
use crewdesk_session::{
    AuthError, AuthPhase, LifecycleConfig, MemoryIdentityBackend, MemoryProfileSource, Role,
    SessionHandle,
};
use std::sync::Arc;
use std::time::Duration;

fn spawn_default(
    backend: Arc<MemoryIdentityBackend>,
    profiles: Arc<MemoryProfileSource>,
) -> SessionHandle {
    SessionHandle::spawn(backend, profiles, LifecycleConfig::default())
}

#[tokio::test]
async fn restores_persisted_session_on_startup() {
    init_logging();
    let backend = Arc::new(backend_with_agents());
    backend.seed_session(AGENT_EMAIL).await.unwrap();

    let handle = spawn_default(backend, Arc::new(profiles_for_agents()));
    let snapshot = handle.settled().await.unwrap();

    assert_eq!(snapshot.phase, AuthPhase::Authenticated);
    assert_eq!(snapshot.user_id(), Some(AGENT_ID));
    assert!(snapshot.session.is_some());

    // the profile arrives asynchronously after the phase settles
    let snapshot = wait_for_snapshot(&handle, |s| s.profile.is_some()).await;
    let profile = snapshot.profile.unwrap();
    assert_eq!(profile.id, AGENT_ID);
    assert_eq!(profile.role, Role::Agent);
    assert_eq!(profile.full_name.as_deref(), Some("Ana Ferreira"));
}

#[tokio::test]
async fn starts_unauthenticated_without_a_session() {
    init_logging();
    let handle = spawn_default(
        Arc::new(backend_with_agents()),
        Arc::new(profiles_for_agents()),
    );

    let snapshot = handle.settled().await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Unauthenticated);
    assert!(snapshot.user.is_none());
    assert!(snapshot.profile.is_none());
    assert!(snapshot.session.is_none());
}

#[tokio::test]
async fn startup_survives_backend_failure() {
    init_logging();
    let memory = Arc::new(backend_with_agents());
    memory.seed_session(AGENT_EMAIL).await.unwrap();

    let counting = CountingBackend::new(memory);
    counting.set_fail_session_lookups(true);

    let handle = SessionHandle::spawn(
        Arc::new(counting),
        Arc::new(profiles_for_agents()),
        LifecycleConfig::default(),
    );

    // a failed startup lookup resolves to signed out rather than hanging
    let snapshot = handle.settled().await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Unauthenticated);
}

#[tokio::test]
async fn sign_in_populates_the_store() {
    init_logging();
    let handle = spawn_default(
        Arc::new(backend_with_agents()),
        Arc::new(profiles_for_agents()),
    );
    handle.settled().await.unwrap();

    handle.sign_in(AGENT_EMAIL, AGENT_PASSWORD).await.unwrap();

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, AuthPhase::Authenticated);
    assert_eq!(snapshot.user_id(), Some(AGENT_ID));
    assert!(snapshot.session.is_some());

    let snapshot = wait_for_snapshot(&handle, |s| s.profile.is_some()).await;
    assert_eq!(snapshot.profile.unwrap().id, AGENT_ID);
}

#[tokio::test]
async fn failed_sign_in_leaves_phase_untouched() {
    init_logging();
    let handle = spawn_default(
        Arc::new(backend_with_agents()),
        Arc::new(profiles_for_agents()),
    );
    handle.settled().await.unwrap();

    let err = handle.sign_in(AGENT_EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::SignIn { .. }));
    assert_eq!(handle.snapshot().phase, AuthPhase::Unauthenticated);

    // a failed attempt must not disturb an existing session either
    handle.sign_in(AGENT_EMAIL, AGENT_PASSWORD).await.unwrap();
    let err = handle.sign_in(ADMIN_EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::SignIn { .. }));

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, AuthPhase::Authenticated);
    assert_eq!(snapshot.user_id(), Some(AGENT_ID));
}

#[tokio::test]
async fn sign_out_clears_everything() {
    init_logging();
    let handle = spawn_default(
        Arc::new(backend_with_agents()),
        Arc::new(profiles_for_agents()),
    );
    handle.settled().await.unwrap();
    handle.sign_in(AGENT_EMAIL, AGENT_PASSWORD).await.unwrap();
    wait_for_snapshot(&handle, |s| s.profile.is_some()).await;

    handle.sign_out().await.unwrap();

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, AuthPhase::Unauthenticated);
    assert!(snapshot.user.is_none());
    assert!(snapshot.profile.is_none());
    assert!(snapshot.session.is_none());
}

#[tokio::test(start_paused = true)]
async fn stale_profile_fetch_is_discarded() {
    init_logging();
    let backend = Arc::new(backend_with_agents());
    let profiles = Arc::new(
        MemoryProfileSource::new()
            .with_profile(agent_profile())
            .with_profile(admin_profile())
            .with_delay(AGENT_ID, Duration::from_millis(500))
            .with_delay(ADMIN_ID, Duration::from_millis(50)),
    );

    let handle = spawn_default(backend, profiles);
    handle.settled().await.unwrap();

    // the agent's slow lookup is still in flight when the admin signs in
    handle.sign_in(AGENT_EMAIL, AGENT_PASSWORD).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    handle.sign_out().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    handle.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();

    // let both lookups resolve; the agent's resolves last and must be dropped
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, AuthPhase::Authenticated);
    assert_eq!(snapshot.user_id(), Some(ADMIN_ID));
    let profile = snapshot.profile.expect("admin profile should be loaded");
    assert_eq!(profile.id, ADMIN_ID);
    assert_eq!(profile.role, Role::Admin);
}

#[tokio::test]
async fn refresh_profile_reloads_current_user() {
    init_logging();
    let backend = Arc::new(backend_with_agents());
    backend.seed_session(AGENT_EMAIL).await.unwrap();
    let profiles = Arc::new(profiles_for_agents());

    let handle = spawn_default(backend, profiles.clone());
    handle.settled().await.unwrap();
    wait_for_snapshot(&handle, |s| s.profile.is_some()).await;

    profiles
        .insert(agent_profile().with_full_name("Ana F. de Souza"))
        .await;
    handle.refresh_profile().await.unwrap();

    let snapshot = handle.snapshot();
    assert_eq!(
        snapshot.profile.unwrap().full_name.as_deref(),
        Some("Ana F. de Souza")
    );
}

#[tokio::test]
async fn refresh_profile_requires_a_user() {
    init_logging();
    let handle = spawn_default(
        Arc::new(backend_with_agents()),
        Arc::new(profiles_for_agents()),
    );
    handle.settled().await.unwrap();

    let err = handle.refresh_profile().await.unwrap_err();
    assert!(matches!(err, AuthError::Session { .. }));
}

#[tokio::test]
async fn cross_tab_storage_clear_forces_local_logout() {
    init_logging();
    let memory = Arc::new(backend_with_agents());
    memory.seed_session(AGENT_EMAIL).await.unwrap();
    let counting = Arc::new(CountingBackend::new(memory.clone()));

    let handle = SessionHandle::spawn(
        counting.clone(),
        Arc::new(profiles_for_agents()),
        LifecycleConfig::default(),
    );
    let snapshot = handle.settled().await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Authenticated);

    // another tab signed out: the storage entry vanishes without an auth event
    memory.simulate_external_sign_out().await;

    let snapshot =
        wait_for_snapshot(&handle, |s| s.phase == AuthPhase::Unauthenticated).await;
    assert!(snapshot.user.is_none());
    assert!(snapshot.profile.is_none());
    assert!(snapshot.session.is_none());

    // the local tab must not call sign-out again
    assert_eq!(counting.sign_outs(), 0);
}

#[tokio::test]
async fn shutdown_closes_the_handle() {
    init_logging();
    let handle = spawn_default(
        Arc::new(backend_with_agents()),
        Arc::new(profiles_for_agents()),
    );
    handle.settled().await.unwrap();

    handle.shutdown().await.unwrap();

    let err = handle
        .sign_in(AGENT_EMAIL, AGENT_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::LifecycleClosed));
}
