//! API client for the board service REST API.
//!
//! Covers the endpoints the guard needs (login, token renewal, board and
//! collaborator lookup) plus board and task listing for the CLI.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::{CredentialKind, CredentialStore};
use crate::models::{Board, Collaborator, TaskSummary};

use super::endpoints::{BoardEndpoint, RenewedAccess, TokenEndpoint, TokenPair};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the board service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Option<Arc<dyn CredentialStore>>,
}

impl ApiClient {
    /// Create a new API client for `base_url`, e.g. `https://host/api`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
        })
    }

    /// Attach the credential store whose access credential authorizes
    /// board requests. Shares the connection pool with `self`.
    pub fn with_credentials(&self, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            credentials: Some(store),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self
            .credentials
            .as_ref()
            .and_then(|store| store.get(CredentialKind::Access))
        {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn map_send_error(e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::NetworkError(e)
        }
    }

    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request, retrying 429 responses with exponential backoff.
    /// `build` is called once per attempt.
    async fn send<F>(&self, url: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await.map_err(Self::map_send_error)?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Self::check_response(response).await;
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }
    }

    async fn parse<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ApiError> {
        let text = response.text().await.map_err(Self::map_send_error)?;
        serde_json::from_str(&text).map_err(|e| {
            debug!(url = url, error = %e, "Failed to parse response");
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .send(&url, || self.authorize(self.client.get(&url)))
            .await?;
        Self::parse(&url, response).await
    }

    // ===== Data Fetching Methods =====

    /// List the boards visible to the caller: owned, shared and public.
    pub async fn list_boards(&self) -> Result<Vec<Board>, ApiError> {
        let url = self.url("v3/boards");
        let response = self
            .send(&url, || self.authorize(self.client.get(&url)))
            .await?;

        let text = response.text().await.map_err(Self::map_send_error)?;
        // The service answers 200 with no body when there are no boards.
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse boards: {}", e)))
    }

    pub async fn fetch_tasks(&self, board_id: &str) -> Result<Vec<TaskSummary>, ApiError> {
        self.get(&format!("v3/boards/{}/tasks", board_id)).await
    }
}

#[async_trait]
impl TokenEndpoint for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let url = self.url("login");
        let body = serde_json::json!({
            "userName": username,
            "password": password,
        });

        let response = self
            .send(&url, || self.client.post(&url).json(&body))
            .await?;
        Self::parse(&url, response).await
    }

    async fn renew(&self, refresh_token: &str) -> Result<RenewedAccess, ApiError> {
        let url = self.url("token");
        let response = self
            .send(&url, || {
                self.client
                    .post(&url)
                    .bearer_auth(refresh_token)
                    .json(&serde_json::json!({}))
            })
            .await?;
        Self::parse(&url, response).await
    }
}

#[async_trait]
impl BoardEndpoint for ApiClient {
    async fn fetch_board(&self, board_id: &str) -> Result<Board, ApiError> {
        self.get(&format!("v3/boards/{}", board_id)).await
    }

    async fn fetch_collaborators(&self, board_id: &str) -> Result<Vec<Collaborator>, ApiError> {
        self.get(&format!("v3/boards/{}/collabs", board_id)).await
    }
}
