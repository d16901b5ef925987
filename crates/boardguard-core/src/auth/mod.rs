//! Authentication module for the credential pair and session renewal.
//!
//! This module provides:
//! - `token`: expiry decoding for JWT credentials
//! - `CredentialStore`: the access/refresh pair plus username, in memory or on disk
//! - `SessionManager`: fast-path validity check and single-flight renewal
//!
//! The access credential is short-lived; the refresh credential is only ever
//! sent to the renewal endpoint.

pub mod credentials;
pub mod session;
pub mod token;

pub use credentials::{
    CredentialKind, CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredentials,
};
pub use session::{
    AuthState, LoginError, SessionError, SessionManager, SessionStatus, UnauthenticatedReason,
};
