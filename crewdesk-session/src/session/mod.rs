//! Session Lifecycle
//!
//! Establishes, verifies, refreshes and tears down the authenticated session,
//! reconciling backend auth events, the periodic liveness timer and cross-tab
//! storage notifications into one consistent view of who is logged in.

pub mod activity;
mod crosstab;
mod liveness;
pub mod reconciler;
pub mod store;

pub use activity::{ActivityTracker, InteractionKind};
pub use reconciler::SessionHandle;
pub use store::{AuthPhase, AuthSnapshot};
