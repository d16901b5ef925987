use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::access::{AccessDecision, AccessResolver};
use crate::auth::{AuthState, SessionManager};

use super::routes::{
    match_route, NavigationTarget, RouteMatch, ACCESS_DENIED_PATH, LOGIN_PATH, NOT_FOUND_PATH,
};

/// Default authenticated landing view.
pub const DEFAULT_LANDING_PATH: &str = "/board";

/// What the router should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NavigationDecision {
    Proceed,
    #[serde(rename_all = "camelCase")]
    Redirect {
        target: String,
        query_redirect: Option<String>,
    },
}

/// Terminal outcome of the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Proceed,
    /// Carries the originally requested path.
    ToLogin(String),
    ToNotFound,
    ToAccessDenied,
    ToLanding,
}

impl GuardOutcome {
    pub fn into_decision(self, landing_path: &str) -> NavigationDecision {
        let redirect = |target: &str, query_redirect: Option<String>| NavigationDecision::Redirect {
            target: target.to_string(),
            query_redirect,
        };
        match self {
            GuardOutcome::Proceed => NavigationDecision::Proceed,
            GuardOutcome::ToLogin(from) => redirect(LOGIN_PATH, Some(from)),
            GuardOutcome::ToNotFound => redirect(NOT_FOUND_PATH, None),
            GuardOutcome::ToAccessDenied => redirect(ACCESS_DENIED_PATH, None),
            GuardOutcome::ToLanding => redirect(landing_path, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GuardState {
    Idle,
    CheckingAccess,
    CheckingSession,
    Done(GuardOutcome),
}

/// Identifies one navigation; only the latest one may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationTicket(u64);

/// Last-navigation-wins bookkeeping.
#[derive(Debug, Default)]
pub struct NavigationTracker {
    latest: AtomicU64,
}

impl NavigationTracker {
    pub fn begin(&self) -> NavigationTicket {
        NavigationTicket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, ticket: NavigationTicket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }
}

/// Decides every protected navigation before anything is rendered.
///
/// Board access is resolved before the session so that public boards never
/// force a login and missing boards answer the same way for everyone.
pub struct NavigationGuard {
    session: Arc<SessionManager>,
    access: Arc<AccessResolver>,
    landing_path: String,
    tracker: NavigationTracker,
}

impl NavigationGuard {
    pub fn new(session: Arc<SessionManager>, access: Arc<AccessResolver>) -> Self {
        Self {
            session,
            access,
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            tracker: NavigationTracker::default(),
        }
    }

    pub fn with_landing_path(mut self, landing_path: impl Into<String>) -> Self {
        self.landing_path = landing_path.into();
        self
    }

    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    /// Run the guard for `path` and return the router decision, or `None`
    /// if a newer navigation started while this one was being checked.
    pub async fn navigate(&self, path: &str) -> Option<NavigationDecision> {
        let ticket = self.tracker.begin();
        let outcome = self.check(path).await;

        if !self.tracker.is_current(ticket) {
            debug!(path = path, "Discarding decision for superseded navigation");
            return None;
        }
        Some(outcome.into_decision(&self.landing_path))
    }

    /// Walk the guard state machine for `path`.
    pub async fn check(&self, path: &str) -> GuardOutcome {
        let target = match match_route(path) {
            RouteMatch::Target(target) => target,
            RouteMatch::Fallback => {
                debug!(path = path, "Unknown path, redirecting to landing view");
                return GuardOutcome::ToLanding;
            }
        };

        let mut state = GuardState::Idle;
        loop {
            state = match state {
                GuardState::Idle if target.board_id.is_some() => GuardState::CheckingAccess,
                GuardState::Idle => GuardState::CheckingSession,
                GuardState::CheckingAccess => self.check_access(&target).await,
                GuardState::CheckingSession => self.check_session(&target).await,
                GuardState::Done(outcome) => {
                    debug!(path = path, ?outcome, "Navigation decided");
                    return outcome;
                }
            };
        }
    }

    async fn check_access(&self, target: &NavigationTarget) -> GuardState {
        let Some(board_id) = target.board_id.as_deref() else {
            return GuardState::CheckingSession;
        };

        let username = self.session.current_username();
        let mut resolution = self.access.resolve(board_id, username.as_deref()).await;

        // A refused bearer is usually just an expired access credential.
        // Renew once and look again.
        if resolution.credential_rejected && self.session.status().is_refresh_valid {
            debug!(board_id = board_id, "Board lookup refused the credential, renewing");
            match self.session.ensure_authenticated().await {
                Ok(AuthState::Authenticated) => {
                    let username = self.session.current_username();
                    resolution = self.access.resolve(board_id, username.as_deref()).await;
                }
                Ok(state) => debug!(board_id = board_id, ?state, "Session could not be renewed"),
                Err(e) => warn!(board_id = board_id, error = %e, "Renewal during access check failed"),
            }
        }

        match resolution.decision {
            AccessDecision { not_found: true, .. } => GuardState::Done(GuardOutcome::ToNotFound),
            AccessDecision { is_public: true, .. } => GuardState::Done(GuardOutcome::Proceed),
            AccessDecision { has_access: false, .. } => {
                info!(board_id = board_id, "Board access denied");
                GuardState::Done(GuardOutcome::ToAccessDenied)
            }
            AccessDecision { .. } => GuardState::CheckingSession,
        }
    }

    async fn check_session(&self, target: &NavigationTarget) -> GuardState {
        if !target.requires_auth && !target.is_login() {
            return GuardState::Done(GuardOutcome::Proceed);
        }

        let authenticated = match self.session.ensure_authenticated().await {
            Ok(state) => state.is_authenticated(),
            Err(e) => {
                warn!(error = %e, path = %target.path, "Session check failed");
                false
            }
        };

        let outcome = match (target.is_login(), authenticated) {
            (true, true) => GuardOutcome::ToLanding,
            (true, false) => GuardOutcome::Proceed,
            (false, true) => GuardOutcome::Proceed,
            (false, false) => GuardOutcome::ToLogin(target.path.clone()),
        };
        GuardState::Done(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::api::{ApiError, BoardEndpoint, RenewedAccess, TokenEndpoint, TokenPair};
    use crate::auth::token::testing::{token_expiring, token_with};
    use crate::auth::token::{self, now_secs};
    use crate::auth::{CredentialStore, MemoryCredentialStore, StoredCredentials};
    use crate::models::{AccessRight, Board, BoardOwner, Collaborator, Visibility};

    struct FakeTokens {
        renewal: Result<String, u16>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenEndpoint for FakeTokens {
        async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
            if (username, password) != ("itbkk.alice", "secret") {
                return Err(ApiError::Unauthorized);
            }
            // Display name differs from the login name.
            Ok(TokenPair {
                access_token: token_with(now_secs() + 1800, Some("alice")),
                refresh_token: token_expiring(now_secs() + 86_400),
            })
        }

        async fn renew(&self, _refresh_token: &str) -> Result<RenewedAccess, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.renewal {
                Ok(token) => Ok(RenewedAccess { access_token: Some(token.clone()) }),
                Err(401) => Err(ApiError::Unauthorized),
                Err(_) => Err(ApiError::ServerError("unavailable".to_string())),
            }
        }
    }

    /// Board "1" private (alice, collaborator bob), "2" public, "slow"
    /// private after a delay, anything else missing.
    struct FakeBoards;

    fn board(id: &str, visibility: Visibility) -> Board {
        Board {
            id: id.to_string(),
            name: format!("Board {}", id),
            owner: BoardOwner { oid: None, name: "alice".to_string() },
            visibility,
        }
    }

    #[async_trait]
    impl BoardEndpoint for FakeBoards {
        async fn fetch_board(&self, board_id: &str) -> Result<Board, ApiError> {
            match board_id {
                "1" => Ok(board("1", Visibility::Private)),
                "2" => Ok(board("2", Visibility::Public)),
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(board("slow", Visibility::Private))
                }
                other => Err(ApiError::NotFound(other.to_string())),
            }
        }

        async fn fetch_collaborators(&self, _board_id: &str) -> Result<Vec<Collaborator>, ApiError> {
            Ok(vec![Collaborator::new("bob", AccessRight::Write)])
        }
    }

    /// Private board "1" (owned by alice) and public board "2", served only
    /// to a live bearer the way the service does.
    struct BearerBoards {
        store: Arc<MemoryCredentialStore>,
    }

    impl BearerBoards {
        fn check_bearer(&self) -> Result<(), ApiError> {
            let access = self.store.snapshot().access_token;
            if token::is_valid(access.as_deref(), now_secs()) {
                Ok(())
            } else {
                Err(ApiError::Unauthorized)
            }
        }
    }

    #[async_trait]
    impl BoardEndpoint for BearerBoards {
        async fn fetch_board(&self, board_id: &str) -> Result<Board, ApiError> {
            match board_id {
                "2" => Ok(board("2", Visibility::Public)),
                "1" => {
                    self.check_bearer()?;
                    Ok(board("1", Visibility::Private))
                }
                other => Err(ApiError::NotFound(other.to_string())),
            }
        }

        async fn fetch_collaborators(&self, _board_id: &str) -> Result<Vec<Collaborator>, ApiError> {
            self.check_bearer()?;
            Ok(Vec::new())
        }
    }

    struct Harness {
        guard: NavigationGuard,
        store: Arc<MemoryCredentialStore>,
        tokens: Arc<FakeTokens>,
    }

    fn live() -> String {
        token_expiring(now_secs() + 600)
    }

    fn expired() -> String {
        token_expiring(now_secs() - 600)
    }

    fn harness(store: MemoryCredentialStore, renewal: Result<String, u16>) -> Harness {
        harness_with(store, renewal, |_| -> Arc<dyn BoardEndpoint> { Arc::new(FakeBoards) })
    }

    fn harness_with<F>(store: MemoryCredentialStore, renewal: Result<String, u16>, boards: F) -> Harness
    where
        F: FnOnce(Arc<MemoryCredentialStore>) -> Arc<dyn BoardEndpoint>,
    {
        let store = Arc::new(store);
        let tokens = Arc::new(FakeTokens { renewal, calls: AtomicUsize::new(0) });
        let session = Arc::new(SessionManager::new(store.clone(), tokens.clone()));
        let access = Arc::new(AccessResolver::new(boards(store.clone())));
        Harness {
            guard: NavigationGuard::new(session, access),
            store,
            tokens,
        }
    }

    fn signed_in(user: &str, access: &str, refresh: &str) -> MemoryCredentialStore {
        let store = MemoryCredentialStore::with_tokens(access, refresh);
        store.set_username(user).unwrap();
        store
    }

    impl Harness {
        fn renewals(&self) -> usize {
            self.tokens.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_missing_board_routes_to_not_found_without_renewal() {
        let h = harness(signed_in("alice", &expired(), &live()), Ok(live()));
        assert_eq!(h.guard.check("/board/99/task").await, GuardOutcome::ToNotFound);
        assert_eq!(h.renewals(), 0);
    }

    #[tokio::test]
    async fn test_missing_board_same_for_anonymous() {
        let h = harness(MemoryCredentialStore::new(), Ok(live()));
        assert_eq!(h.guard.check("/board/99/task").await, GuardOutcome::ToNotFound);
    }

    #[tokio::test]
    async fn test_public_board_needs_no_session() {
        let h = harness(MemoryCredentialStore::new(), Err(500));
        assert_eq!(h.guard.check("/board/2/task").await, GuardOutcome::Proceed);
        assert_eq!(h.renewals(), 0);
    }

    #[tokio::test]
    async fn test_stranger_denied_without_renewal() {
        let h = harness(signed_in("carol", &live(), &live()), Ok(live()));
        assert_eq!(h.guard.check("/board/1/task").await, GuardOutcome::ToAccessDenied);
        assert_eq!(h.renewals(), 0);
    }

    #[tokio::test]
    async fn test_collaborator_with_stale_access_renews_then_proceeds() {
        let refresh = live();
        let h = harness(signed_in("bob", &expired(), &refresh), Ok(live()));
        assert_eq!(h.guard.check("/board/1/task/5").await, GuardOutcome::Proceed);
        assert_eq!(h.renewals(), 1);
        assert_eq!(h.store.snapshot().refresh_token.as_deref(), Some(refresh.as_str()));
    }

    fn bearer_boards(store: Arc<MemoryCredentialStore>) -> Arc<dyn BoardEndpoint> {
        Arc::new(BearerBoards { store })
    }

    #[tokio::test]
    async fn test_stale_access_is_renewed_before_board_lookup_retry() {
        let refresh = live();
        let h = harness_with(signed_in("alice", &expired(), &refresh), Ok(live()), bearer_boards);
        assert_eq!(h.guard.check("/board/1/task").await, GuardOutcome::Proceed);
        assert_eq!(h.renewals(), 1);
        assert!(h.guard.session.status().is_access_valid);
        assert_eq!(h.store.snapshot().refresh_token.as_deref(), Some(refresh.as_str()));
    }

    #[tokio::test]
    async fn test_refused_lookup_with_rejected_refresh_is_denied() {
        let h = harness_with(signed_in("alice", &expired(), &live()), Err(401), bearer_boards);
        assert_eq!(h.guard.check("/board/1/task").await, GuardOutcome::ToAccessDenied);
        assert_eq!(h.renewals(), 1);
        assert_eq!(h.store.snapshot(), StoredCredentials::default());
    }

    #[tokio::test]
    async fn test_refused_lookup_without_session_does_not_renew() {
        let h = harness_with(MemoryCredentialStore::new(), Ok(live()), bearer_boards);
        assert_eq!(h.guard.check("/board/1/task").await, GuardOutcome::ToAccessDenied);
        assert_eq!(h.guard.check("/board/2/task").await, GuardOutcome::Proceed);
        assert_eq!(h.renewals(), 0);
    }

    #[tokio::test]
    async fn test_owner_recognized_by_display_name_after_login() {
        let h = harness(MemoryCredentialStore::new(), Err(500));
        h.guard.session.login("itbkk.alice", "secret").await.unwrap();
        assert_eq!(h.guard.check("/board/1/task").await, GuardOutcome::Proceed);
        assert_eq!(h.renewals(), 0);
    }

    #[tokio::test]
    async fn test_owner_with_dead_session_goes_to_login() {
        let h = harness(signed_in("alice", &expired(), &expired()), Ok(live()));
        assert_eq!(
            h.guard.check("/board/1/status").await,
            GuardOutcome::ToLogin("/board/1/status".to_string())
        );
        assert_eq!(h.renewals(), 0);
        assert_eq!(h.store.snapshot(), StoredCredentials::default());
    }

    #[tokio::test]
    async fn test_rejected_refresh_goes_to_login() {
        let h = harness(signed_in("alice", &expired(), &live()), Err(401));
        assert_eq!(h.guard.check("/board").await, GuardOutcome::ToLogin("/board".to_string()));
        assert_eq!(h.store.snapshot(), StoredCredentials::default());
    }

    #[tokio::test]
    async fn test_transient_failure_goes_to_login_and_keeps_credentials() {
        let h = harness(signed_in("alice", &expired(), &live()), Err(503));
        let decision = h.guard.navigate("/board/add").await;
        assert_eq!(
            decision,
            Some(NavigationDecision::Redirect {
                target: LOGIN_PATH.to_string(),
                query_redirect: Some("/board/add".to_string()),
            })
        );
        assert!(h.store.snapshot().refresh_token.is_some());
        assert_eq!(h.renewals(), 1);
    }

    #[tokio::test]
    async fn test_login_view_when_authenticated_goes_to_landing() {
        let h = harness(signed_in("alice", &live(), &live()), Err(500));
        assert_eq!(
            h.guard.navigate("/login").await,
            Some(NavigationDecision::Redirect {
                target: DEFAULT_LANDING_PATH.to_string(),
                query_redirect: None,
            })
        );
    }

    #[tokio::test]
    async fn test_login_view_when_signed_out_proceeds() {
        let h = harness(MemoryCredentialStore::new(), Ok(live()));
        assert_eq!(h.guard.check("/login").await, GuardOutcome::Proceed);
    }

    #[tokio::test]
    async fn test_unknown_path_goes_to_custom_landing() {
        let h = harness(MemoryCredentialStore::new(), Ok(live()));
        let guard = h.guard.with_landing_path("/board/2/task");
        assert_eq!(
            guard.navigate("/nowhere").await,
            Some(NavigationDecision::Redirect {
                target: "/board/2/task".to_string(),
                query_redirect: None,
            })
        );
    }

    #[tokio::test]
    async fn test_redirect_targets_do_not_loop() {
        let h = harness(MemoryCredentialStore::new(), Err(500));
        for path in [LOGIN_PATH, NOT_FOUND_PATH, ACCESS_DENIED_PATH] {
            assert_eq!(h.guard.check(path).await, GuardOutcome::Proceed, "{}", path);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_navigation_is_discarded() {
        let h = harness(signed_in("alice", &live(), &live()), Ok(live()));
        let (stale, fresh) = tokio::join!(h.guard.navigate("/board/slow/task"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.guard.navigate("/board/1/task").await
        });
        assert_eq!(stale, None);
        assert_eq!(fresh, Some(NavigationDecision::Proceed));
    }

    #[test]
    fn test_tracker_latest_wins() {
        let tracker = NavigationTracker::default();
        let first = tracker.begin();
        assert!(tracker.is_current(first));
        let second = tracker.begin();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
    }

    #[test]
    fn test_decision_serialization() {
        let decision = GuardOutcome::ToLogin("/board/1/task".to_string()).into_decision("/board");
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "redirect",
                "target": "/login",
                "queryRedirect": "/board/1/task",
            })
        );
        let json = serde_json::to_value(NavigationDecision::Proceed).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "proceed" }));
    }
}
