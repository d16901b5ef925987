//! REST API client module for the board service.
//!
//! This module provides the `ApiClient` for the login, token renewal and
//! board endpoints, plus the endpoint traits the guard is written against.
//!
//! The service issues JWT bearer credentials from `/login` and renews the
//! access credential from `/token`.

pub mod client;
pub mod endpoints;
pub mod error;

pub use client::ApiClient;
pub use endpoints::{BoardEndpoint, RenewedAccess, TokenEndpoint, TokenPair};
pub use error::ApiError;
