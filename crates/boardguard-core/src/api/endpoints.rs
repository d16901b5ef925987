//! Remote collaborators consumed by the session and access layers.
//!
//! `ApiClient` implements these against the board service. Tests supply
//! in-memory fakes.

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{Board, Collaborator};

use super::ApiError;

/// Credential pair returned by a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Body of a successful renewal. The service may omit the token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenewedAccess {
    #[serde(default)]
    pub access_token: Option<String>,
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError>;

    /// Exchange a refresh credential for a new access credential.
    /// `ApiError::Unauthorized` means the refresh credential was rejected.
    async fn renew(&self, refresh_token: &str) -> Result<RenewedAccess, ApiError>;
}

#[async_trait]
pub trait BoardEndpoint: Send + Sync {
    /// Forbidden and not-found surface as `ApiError::AccessDenied` and
    /// `ApiError::NotFound`.
    async fn fetch_board(&self, board_id: &str) -> Result<Board, ApiError>;

    async fn fetch_collaborators(&self, board_id: &str) -> Result<Vec<Collaborator>, ApiError>;
}
