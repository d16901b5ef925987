use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::api::{ApiError, BoardEndpoint};
use crate::models::Collaborator;

use super::policy::{evaluate, AccessDecision, AccessFacts, BoardLookup, Evaluation};

/// Default upper bound on each board or collaborator lookup.
pub const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 10;

/// A decision plus whether the service refused the bearer credential on
/// the way. A refused credential may just be stale; the caller can renew
/// it and resolve again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessResolution {
    pub decision: AccessDecision,
    pub credential_rejected: bool,
}

impl AccessResolution {
    fn settled(decision: AccessDecision) -> Self {
        Self { decision, credential_rejected: false }
    }

    fn rejected() -> Self {
        Self { decision: AccessDecision::DENIED, credential_rejected: true }
    }
}

/// Resolves whether a user may view a board.
///
/// Never fails: every lookup error degrades to a deny, or to not-found when
/// the error says the board is gone.
pub struct AccessResolver {
    boards: Arc<dyn BoardEndpoint>,
    timeout: Duration,
}

impl AccessResolver {
    pub fn new(boards: Arc<dyn BoardEndpoint>) -> Self {
        Self {
            boards,
            timeout: Duration::from_secs(DEFAULT_LOOKUP_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn resolve_access(&self, board_id: &str, username: Option<&str>) -> AccessDecision {
        self.resolve(board_id, username).await.decision
    }

    /// Like `resolve_access`, but also reports a refused bearer credential.
    pub async fn resolve(&self, board_id: &str, username: Option<&str>) -> AccessResolution {
        let lookup = match self.lookup_board(board_id).await {
            Ok(lookup) => lookup,
            Err(decision) => return AccessResolution::settled(decision),
        };
        if matches!(lookup, BoardLookup::Unauthorized) {
            debug!(board_id = board_id, "Board lookup refused the credential");
            return AccessResolution::rejected();
        }

        let mut collaborators: Option<Vec<Collaborator>> = None;
        loop {
            let facts = AccessFacts {
                lookup: &lookup,
                username,
                collaborators: collaborators.as_deref(),
            };
            match evaluate(&facts) {
                Evaluation::Decided(decision) => {
                    debug!(board_id = board_id, ?decision, "Access resolved");
                    return AccessResolution::settled(decision);
                }
                // Only reachable once; the list is supplied below.
                Evaluation::NeedsCollaborators => match self.fetch_collaborators(board_id).await {
                    Ok(list) => collaborators = Some(list),
                    Err(resolution) => return resolution,
                },
            }
        }
    }

    /// Fetch the board. Forbidden, unauthorized and not-found become lookups
    /// for the policy to rank; anything else short-circuits to a degraded
    /// decision.
    async fn lookup_board(&self, board_id: &str) -> Result<BoardLookup, AccessDecision> {
        match tokio::time::timeout(self.timeout, self.boards.fetch_board(board_id)).await {
            Ok(Ok(board)) => Ok(BoardLookup::Found(board)),
            Ok(Err(e)) if e.is_forbidden() => Ok(BoardLookup::Forbidden),
            Ok(Err(e)) if e.is_unauthorized() => Ok(BoardLookup::Unauthorized),
            Ok(Err(e)) if e.is_not_found() => Ok(BoardLookup::NotFound),
            Ok(Err(e)) => Err(Self::degrade(board_id, "board", &e)),
            Err(_) => {
                warn!(board_id = board_id, timeout = ?self.timeout, "Board lookup timed out");
                Err(AccessDecision::DENIED)
            }
        }
    }

    async fn fetch_collaborators(&self, board_id: &str) -> Result<Vec<Collaborator>, AccessResolution> {
        match tokio::time::timeout(self.timeout, self.boards.fetch_collaborators(board_id)).await {
            Ok(Ok(list)) => Ok(list),
            Ok(Err(e)) if e.is_unauthorized() => Err(AccessResolution::rejected()),
            Ok(Err(e)) => Err(AccessResolution::settled(Self::degrade(board_id, "collaborator", &e))),
            Err(_) => {
                warn!(board_id = board_id, timeout = ?self.timeout, "Collaborator lookup timed out");
                Err(AccessResolution::settled(AccessDecision::DENIED))
            }
        }
    }

    fn degrade(board_id: &str, what: &str, e: &ApiError) -> AccessDecision {
        warn!(board_id = board_id, lookup = what, error = %e, "Access lookup failed");
        AccessDecision::degraded(e.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::models::{AccessRight, Board, BoardOwner, Visibility};

    enum BoardReply {
        Found(Board),
        Forbidden,
        NotFound,
        Unauthorized,
        ServerError,
        Hang,
    }

    enum CollabReply {
        List(Vec<Collaborator>),
        NotFound,
        ServerError,
    }

    #[derive(Default)]
    struct FakeBoards {
        boards: HashMap<String, BoardReply>,
        collabs: HashMap<String, CollabReply>,
        collab_calls: AtomicUsize,
    }

    impl FakeBoards {
        fn with_board(mut self, id: &str, reply: BoardReply) -> Self {
            self.boards.insert(id.to_string(), reply);
            self
        }

        fn with_collabs(mut self, id: &str, reply: CollabReply) -> Self {
            self.collabs.insert(id.to_string(), reply);
            self
        }
    }

    #[async_trait]
    impl BoardEndpoint for FakeBoards {
        async fn fetch_board(&self, board_id: &str) -> Result<Board, ApiError> {
            match self.boards.get(board_id) {
                Some(BoardReply::Found(b)) => Ok(b.clone()),
                Some(BoardReply::Forbidden) => Err(ApiError::AccessDenied("forbidden".to_string())),
                Some(BoardReply::Unauthorized) => Err(ApiError::Unauthorized),
                Some(BoardReply::ServerError) => Err(ApiError::ServerError("boom".to_string())),
                Some(BoardReply::Hang) => std::future::pending().await,
                Some(BoardReply::NotFound) | None => Err(ApiError::NotFound(board_id.to_string())),
            }
        }

        async fn fetch_collaborators(&self, board_id: &str) -> Result<Vec<Collaborator>, ApiError> {
            self.collab_calls.fetch_add(1, Ordering::SeqCst);
            match self.collabs.get(board_id) {
                Some(CollabReply::List(l)) => Ok(l.clone()),
                Some(CollabReply::NotFound) => Err(ApiError::NotFound(board_id.to_string())),
                Some(CollabReply::ServerError) => Err(ApiError::ServerError("boom".to_string())),
                None => Ok(Vec::new()),
            }
        }
    }

    fn alice_board(visibility: Visibility) -> Board {
        Board {
            id: "1".to_string(),
            name: "Sprint".to_string(),
            owner: BoardOwner { oid: Some("u1".to_string()), name: "alice".to_string() },
            visibility,
        }
    }

    fn resolver(fake: FakeBoards) -> (AccessResolver, Arc<FakeBoards>) {
        let fake = Arc::new(fake);
        (AccessResolver::new(fake.clone()), fake)
    }

    fn private_board_with_bob() -> FakeBoards {
        FakeBoards::default()
            .with_board("1", BoardReply::Found(alice_board(Visibility::Private)))
            .with_collabs("1", CollabReply::List(vec![Collaborator::new("bob", AccessRight::Write)]))
    }

    #[tokio::test]
    async fn test_collaborator_granted() {
        let (resolver, _) = resolver(private_board_with_bob());
        assert_eq!(
            resolver.resolve_access("1", Some("bob")).await,
            AccessDecision { has_access: true, not_found: false, is_public: false }
        );
    }

    #[tokio::test]
    async fn test_stranger_denied() {
        let (resolver, _) = resolver(private_board_with_bob());
        assert_eq!(
            resolver.resolve_access("1", Some("carol")).await,
            AccessDecision { has_access: false, not_found: false, is_public: false }
        );
    }

    #[tokio::test]
    async fn test_missing_board_is_not_found() {
        let (resolver, fake) = resolver(FakeBoards::default().with_board("42", BoardReply::NotFound));
        for id in ["42", "99"] {
            assert_eq!(
                resolver.resolve_access(id, Some("alice")).await,
                AccessDecision { has_access: false, not_found: true, is_public: false }
            );
        }
        assert_eq!(fake.collab_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refused_credential_is_reported() {
        let (resolver, fake) = resolver(FakeBoards::default().with_board("1", BoardReply::Unauthorized));
        let resolution = resolver.resolve("1", Some("alice")).await;
        assert_eq!(resolution.decision, AccessDecision::DENIED);
        assert!(resolution.credential_rejected);
        assert_eq!(resolver.resolve_access("1", Some("alice")).await, AccessDecision::DENIED);
        assert_eq!(fake.collab_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_settled_decisions_do_not_report_rejection() {
        let (resolver, _) = resolver(
            private_board_with_bob().with_board("2", BoardReply::Forbidden),
        );
        assert!(!resolver.resolve("1", Some("bob")).await.credential_rejected);
        assert!(!resolver.resolve("1", Some("carol")).await.credential_rejected);
        assert!(!resolver.resolve("2", Some("bob")).await.credential_rejected);
        assert!(!resolver.resolve("99", Some("bob")).await.credential_rejected);
    }

    #[tokio::test]
    async fn test_forbidden_board_denied() {
        let (resolver, fake) = resolver(FakeBoards::default().with_board("1", BoardReply::Forbidden));
        assert_eq!(resolver.resolve_access("1", Some("bob")).await, AccessDecision::DENIED);
        assert_eq!(fake.collab_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_public_board_without_username() {
        let (resolver, fake) = resolver(
            FakeBoards::default().with_board("1", BoardReply::Found(alice_board(Visibility::Public))),
        );
        assert_eq!(resolver.resolve_access("1", None).await, AccessDecision::PUBLIC);
        assert_eq!(fake.collab_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_owner_skips_collaborator_lookup() {
        let (resolver, fake) = resolver(private_board_with_bob());
        assert_eq!(resolver.resolve_access("1", Some("alice")).await, AccessDecision::GRANTED);
        assert_eq!(fake.collab_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_anonymous_on_private_board_denied_without_lookup() {
        let (resolver, fake) = resolver(private_board_with_bob());
        assert_eq!(resolver.resolve_access("1", None).await, AccessDecision::DENIED);
        assert_eq!(fake.collab_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_access_right_denied() {
        let (resolver, _) = resolver(
            FakeBoards::default()
                .with_board("1", BoardReply::Found(alice_board(Visibility::Private)))
                .with_collabs("1", CollabReply::List(vec![Collaborator::new("erin", AccessRight::Unknown)])),
        );
        assert_eq!(resolver.resolve_access("1", Some("erin")).await, AccessDecision::DENIED);
    }

    #[tokio::test]
    async fn test_board_server_error_degrades_to_deny() {
        let (resolver, _) = resolver(FakeBoards::default().with_board("1", BoardReply::ServerError));
        assert_eq!(resolver.resolve_access("1", Some("alice")).await, AccessDecision::DENIED);
    }

    #[tokio::test]
    async fn test_collaborator_errors_degrade() {
        let (resolver, _) = resolver(
            FakeBoards::default()
                .with_board("1", BoardReply::Found(alice_board(Visibility::Private)))
                .with_collabs("1", CollabReply::ServerError)
                .with_board("2", BoardReply::Found(alice_board(Visibility::Private)))
                .with_collabs("2", CollabReply::NotFound),
        );
        assert_eq!(resolver.resolve_access("1", Some("bob")).await, AccessDecision::DENIED);
        assert_eq!(resolver.resolve_access("2", Some("bob")).await, AccessDecision::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_lookup_times_out_to_deny() {
        let fake = Arc::new(FakeBoards::default().with_board("1", BoardReply::Hang));
        let resolver = AccessResolver::new(fake).with_timeout(Duration::from_secs(2));
        assert_eq!(resolver.resolve_access("1", Some("alice")).await, AccessDecision::DENIED);
    }
}
