//! Profile Loading
//!
//! Application-level user records (role, display name) layered on top of the
//! backend's bare identity. A profile lookup is best-effort: a missing row
//! and a failed fetch both degrade to "no profile", never to a crashed
//! session initialization.

use crate::backend::BackendResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Closed set of application roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Advisor,
    Staff,
    Agent,
    Admin,
    SuperAdmin,
    Concierge,
}

impl Role {
    /// Whether this role bypasses ordinary role checks entirely
    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// Check whether this role satisfies a required role
    pub fn grants(&self, required: Role) -> bool {
        self.is_super_admin() || *self == required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Advisor => write!(f, "advisor"),
            Role::Staff => write!(f, "staff"),
            Role::Agent => write!(f, "agent"),
            Role::Admin => write!(f, "admin"),
            Role::SuperAdmin => write!(f, "super_admin"),
            Role::Concierge => write!(f, "concierge"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "advisor" => Ok(Role::Advisor),
            "staff" => Ok(Role::Staff),
            "agent" => Ok(Role::Agent),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            "concierge" => Ok(Role::Concierge),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Application-level user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Foreign key to the backend user id
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: &str, email: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            full_name: None,
            role,
            created_at: Utc::now(),
        }
    }

    pub fn with_full_name<S: Into<String>>(mut self, full_name: S) -> Self {
        self.full_name = Some(full_name.into());
        self
    }
}

/// Single-row profile lookup by user id
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch the profile row for a user, `None` when no row exists
    async fn fetch_profile(&self, user_id: &str) -> BackendResult<Option<Profile>>;
}

/// Error-absorbing wrapper around a [`ProfileSource`]
///
/// All failure modes collapse to `None`: the session lifecycle must never be
/// blocked by a profile that cannot be fetched.
#[derive(Clone)]
pub struct ProfileLoader {
    source: Arc<dyn ProfileSource>,
}

impl ProfileLoader {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self { source }
    }

    /// Load the profile for a user id, degrading every failure to `None`
    pub async fn load_profile(&self, user_id: &str) -> Option<Profile> {
        if user_id.is_empty() {
            warn!("profile lookup requested for an empty user id");
            return None;
        }

        match self.source.fetch_profile(user_id).await {
            Ok(Some(profile)) => {
                debug!(user_id = %user_id, role = %profile.role, "profile loaded");
                Some(profile)
            }
            Ok(None) => {
                debug!(user_id = %user_id, "no profile row for user");
                None
            }
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    error = %err,
                    "profile lookup failed, continuing without a profile"
                );
                None
            }
        }
    }
}

/// In-memory [`ProfileSource`] for tests and simple deployments
///
/// Supports per-user artificial latency and failure injection so lifecycle
/// scenarios (out-of-order fetches, degraded lookups) can be driven.
pub struct MemoryProfileSource {
    profiles: RwLock<HashMap<String, Profile>>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
}

impl MemoryProfileSource {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            delays: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    /// Register a profile row
    pub fn with_profile(self, profile: Profile) -> Self {
        {
            let mut profiles = self
                .profiles
                .try_write()
                .expect("source is not shared during construction");
            profiles.insert(profile.id.clone(), profile);
        }
        self
    }

    /// Delay lookups for one user id by the given duration
    pub fn with_delay(mut self, user_id: &str, delay: Duration) -> Self {
        self.delays.insert(user_id.to_string(), delay);
        self
    }

    /// Make lookups for one user id fail with a network error
    pub fn with_failure(mut self, user_id: &str) -> Self {
        self.failing.insert(user_id.to_string());
        self
    }

    /// Insert or replace a profile row
    pub async fn insert(&self, profile: Profile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }
}

impl Default for MemoryProfileSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileSource for MemoryProfileSource {
    async fn fetch_profile(&self, user_id: &str) -> BackendResult<Option<Profile>> {
        if let Some(delay) = self.delays.get(user_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(user_id) {
            return Err(crate::backend::BackendError::network(format!(
                "profile lookup unavailable for {}",
                user_id
            )));
        }
        Ok(self.profiles.read().await.get(user_id).cloned())
    }
}
