//! boardguard core: session renewal, board access policy and the
//! navigation guard for a collaborative board client.
//!
//! The CLI in `boardguard-cli` wires these together; everything here is
//! written against the `TokenEndpoint`/`BoardEndpoint` traits so it can run
//! on the real `ApiClient` or on in-memory fakes.

pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

pub use access::{AccessDecision, AccessResolver};
pub use api::{ApiClient, ApiError};
pub use auth::{AuthState, FileCredentialStore, SessionManager};
pub use config::Config;
pub use guard::{GuardOutcome, NavigationDecision, NavigationGuard};
