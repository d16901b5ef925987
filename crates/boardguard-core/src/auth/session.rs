use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiError, TokenEndpoint};

use super::credentials::{CredentialKind, CredentialStore, StoredCredentials};
use super::token;

/// Default upper bound on a single renewal request.
pub const DEFAULT_RENEWAL_TIMEOUT_SECS: u64 = 10;

/// Login form limits enforced by the service.
const MAX_USERNAME_LENGTH: usize = 50;
const MAX_PASSWORD_LENGTH: usize = 14;

/// Renewal failures that leave the stored credentials untouched.
/// The next navigation may try again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("token renewal failed: {0}")]
    Renewal(String),

    #[error("token renewal timed out after {0:?}")]
    Timeout(Duration),

    #[error("renewal succeeded but no access token was returned")]
    MissingAccessToken,

    #[error("renewed access token could not be stored: {0}")]
    Storage(String),
}

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("{0}")]
    Invalid(&'static str),

    #[error("The username or password is incorrect")]
    Rejected,

    #[error("login failed: {0}")]
    Api(#[source] ApiError),

    #[error("failed to store credentials: {0}")]
    Storage(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    /// No usable refresh credential was stored.
    NoSession,
    /// The service rejected the refresh credential.
    RefreshRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Authenticated,
    Unauthenticated(UnauthenticatedReason),
}

impl AuthState {
    pub fn is_authenticated(self) -> bool {
        self == AuthState::Authenticated
    }
}

/// Point-in-time view of the stored pair. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub is_access_valid: bool,
    pub is_refresh_valid: bool,
    pub access_expires_in_sec: Option<i64>,
    pub refresh_expires_in_sec: Option<i64>,
}

impl SessionStatus {
    pub fn evaluate(stored: &StoredCredentials, now_sec: i64) -> Self {
        let access = stored.get(CredentialKind::Access);
        let refresh = stored.get(CredentialKind::Refresh);
        Self {
            is_access_valid: token::is_valid(access, now_sec),
            is_refresh_valid: token::is_valid(refresh, now_sec),
            access_expires_in_sec: token::remaining_seconds(access, now_sec),
            refresh_expires_in_sec: token::remaining_seconds(refresh, now_sec),
        }
    }
}

/// Result of the most recent renewal, handed to callers that queued
/// behind it instead of renewing again.
struct RenewalSlot {
    last: Option<Result<AuthState, SessionError>>,
}

/// Owns the "is this session authenticated" decision and the renewal of
/// the access credential.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    renewal_timeout: Duration,
    clock: fn() -> i64,
    renewal: Mutex<RenewalSlot>,
    renewals_completed: AtomicU64,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            store,
            endpoint,
            renewal_timeout: Duration::from_secs(DEFAULT_RENEWAL_TIMEOUT_SECS),
            clock: token::now_secs,
            renewal: Mutex::new(RenewalSlot { last: None }),
            renewals_completed: AtomicU64::new(0),
        }
    }

    pub fn with_renewal_timeout(mut self, timeout: Duration) -> Self {
        self.renewal_timeout = timeout;
        self
    }

    /// Replace the wall clock, in seconds since the epoch.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::evaluate(&self.store.snapshot(), (self.clock)())
    }

    /// The signed-in user's display name: the one stored at login, else the
    /// access credential's `name` claim.
    pub fn current_username(&self) -> Option<String> {
        let stored = self.store.snapshot();
        stored
            .username
            .filter(|u| !u.trim().is_empty())
            .or_else(|| {
                let access = stored.access_token.as_deref()?;
                token::decode_claims(access).ok()?.name
            })
    }

    /// Make sure the stored access credential is usable, renewing it at most
    /// once if it is not.
    ///
    /// A caller that arrives while another renewal is in flight waits for it
    /// and returns its result instead of issuing a second request. A login or
    /// logout in between discards that result.
    pub async fn ensure_authenticated(&self) -> Result<AuthState, SessionError> {
        if self.status().is_access_valid {
            debug!("Access token valid");
            return Ok(AuthState::Authenticated);
        }

        let seen = self.renewals_completed.load(Ordering::Acquire);
        let mut slot = self.renewal.lock().await;

        if self.renewals_completed.load(Ordering::Acquire) != seen {
            if let Some(last) = slot.last.clone() {
                debug!("Reusing result of concurrent renewal");
                return last;
            }
        }

        let result = self.renew_locked().await;
        slot.last = Some(result.clone());
        self.renewals_completed.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// Renewal body; the caller holds the renewal lock.
    async fn renew_locked(&self) -> Result<AuthState, SessionError> {
        let stored = self.store.snapshot();
        let now = (self.clock)();

        // A login may have landed while this caller waited for the lock.
        if token::is_valid(stored.access_token.as_deref(), now) {
            return Ok(AuthState::Authenticated);
        }

        let refresh = match stored.refresh_token {
            Some(ref r) if token::is_valid(Some(r.as_str()), now) => r.clone(),
            _ => {
                info!("No valid refresh token, clearing session");
                self.clear_store();
                return Ok(AuthState::Unauthenticated(UnauthenticatedReason::NoSession));
            }
        };

        debug!(timeout = ?self.renewal_timeout, "Renewing access token");
        let outcome = tokio::time::timeout(self.renewal_timeout, self.endpoint.renew(&refresh)).await;

        match outcome {
            Err(_) => {
                warn!(timeout = ?self.renewal_timeout, "Token renewal timed out");
                Err(SessionError::Timeout(self.renewal_timeout))
            }
            Ok(Err(ApiError::Unauthorized)) => {
                warn!("Refresh token rejected, clearing session");
                self.clear_store();
                Ok(AuthState::Unauthenticated(UnauthenticatedReason::RefreshRejected))
            }
            Ok(Err(ApiError::Timeout)) => {
                warn!("Token renewal request timed out");
                Err(SessionError::Timeout(self.renewal_timeout))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Token renewal failed");
                Err(SessionError::Renewal(e.to_string()))
            }
            Ok(Ok(renewed)) => match renewed.access_token.filter(|t| !t.trim().is_empty()) {
                Some(access) => {
                    if let Err(e) = self.store.set(&access, &refresh) {
                        warn!(error = %e, "Failed to persist renewed access token");
                        return Err(SessionError::Storage(e.to_string()));
                    }
                    info!("Access token renewed");
                    Ok(AuthState::Authenticated)
                }
                None => {
                    warn!("Renewal response carried no access token");
                    Err(SessionError::MissingAccessToken)
                }
            },
        }
    }

    /// Authenticate against the service and store the resulting pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), LoginError> {
        let username = username.trim();
        validate_login(username, password)?;

        let pair = match self.endpoint.login(username, password).await {
            Ok(pair) => pair,
            Err(ApiError::Unauthorized) => return Err(LoginError::Rejected),
            Err(e) => return Err(LoginError::Api(e)),
        };

        // Boards list owners and collaborators by display name, which is
        // the `name` claim; the login name is only a fallback.
        let identity = token::decode_claims(&pair.access_token)
            .ok()
            .and_then(|claims| claims.name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| username.to_string());

        // Serialize against any in-flight renewal.
        let mut slot = self.renewal.lock().await;
        slot.last = None;
        self.store
            .clear()
            .and_then(|_| self.store.set(&pair.access_token, &pair.refresh_token))
            .and_then(|_| self.store.set_username(&identity))
            .map_err(LoginError::Storage)?;

        info!(username = username, identity = %identity, "Login successful");
        Ok(())
    }

    pub async fn logout(&self) -> anyhow::Result<()> {
        let mut slot = self.renewal.lock().await;
        slot.last = None;
        self.store.clear()?;
        info!("Logged out");
        Ok(())
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credentials");
        }
    }
}

fn validate_login(username: &str, password: &str) -> Result<(), LoginError> {
    if username.is_empty() || password.is_empty() {
        return Err(LoginError::Invalid("Username and password required"));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(LoginError::Invalid("Username must be at most 50 characters long"));
    }
    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(LoginError::Invalid("Password must be at most 14 characters long"));
    }
    Ok(())
}
