//! The board access policy as an ordered list of tiers.
//!
//! Each tier is a predicate over what is known about the board and the
//! caller, paired with the decision it produces. Tiers are tried in
//! `ACCESS_POLICY` order and the first match wins; no match means deny.

use serde::Serialize;

use crate::models::{Board, Collaborator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub has_access: bool,
    pub not_found: bool,
    pub is_public: bool,
}

impl AccessDecision {
    pub const DENIED: Self = Self { has_access: false, not_found: false, is_public: false };
    pub const NOT_FOUND: Self = Self { has_access: false, not_found: true, is_public: false };
    pub const PUBLIC: Self = Self { has_access: true, not_found: false, is_public: true };
    pub const GRANTED: Self = Self { has_access: true, not_found: false, is_public: false };

    /// Conservative decision for a lookup that failed outright.
    pub fn degraded(not_found: bool) -> Self {
        if not_found {
            Self::NOT_FOUND
        } else {
            Self::DENIED
        }
    }
}

/// Outcome of fetching the board itself.
#[derive(Debug, Clone)]
pub enum BoardLookup {
    Found(Board),
    Forbidden,
    /// The service refused the bearer credential, usually because it expired.
    Unauthorized,
    NotFound,
}

/// Result of walking the tiers over what is known so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Decided(AccessDecision),
    /// A tier that reads the collaborator list was reached before the list
    /// was supplied. Fetch it and evaluate again.
    NeedsCollaborators,
}

/// Everything the tiers look at. `collaborators` is filled in only once a
/// tier that needs it is reached.
#[derive(Debug, Clone, Copy)]
pub struct AccessFacts<'a> {
    pub lookup: &'a BoardLookup,
    pub username: Option<&'a str>,
    pub collaborators: Option<&'a [Collaborator]>,
}

impl<'a> AccessFacts<'a> {
    fn board(&self) -> Option<&'a Board> {
        match self.lookup {
            BoardLookup::Found(board) => Some(board),
            _ => None,
        }
    }

    fn username(&self) -> Option<&'a str> {
        self.username.map(str::trim).filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    Forbidden,
    NotFound,
    Public,
    Owner,
    Collaborator,
}

/// Evaluation order. First match wins.
pub const ACCESS_POLICY: [AccessTier; 5] = [
    AccessTier::Forbidden,
    AccessTier::NotFound,
    AccessTier::Public,
    AccessTier::Owner,
    AccessTier::Collaborator,
];

impl AccessTier {
    /// Whether the predicate reads the collaborator list.
    pub fn needs_collaborators(self) -> bool {
        self == AccessTier::Collaborator
    }

    pub fn matches(self, facts: &AccessFacts<'_>) -> bool {
        match self {
            AccessTier::Forbidden => {
                matches!(facts.lookup, BoardLookup::Forbidden | BoardLookup::Unauthorized)
            }
            AccessTier::NotFound => matches!(facts.lookup, BoardLookup::NotFound),
            AccessTier::Public => facts.board().is_some_and(Board::is_public),
            AccessTier::Owner => match (facts.board(), facts.username()) {
                (Some(board), Some(user)) => board.is_owned_by(user),
                _ => false,
            },
            AccessTier::Collaborator => match (facts.collaborators, facts.username()) {
                (Some(collabs), Some(user)) => has_read_access(collabs, user),
                _ => false,
            },
        }
    }

    pub fn outcome(self) -> AccessDecision {
        match self {
            AccessTier::Forbidden => AccessDecision::DENIED,
            AccessTier::NotFound => AccessDecision::NOT_FOUND,
            AccessTier::Public => AccessDecision::PUBLIC,
            AccessTier::Owner | AccessTier::Collaborator => AccessDecision::GRANTED,
        }
    }
}

/// Walk `ACCESS_POLICY` in order. Stops early when the collaborator tier is
/// reached without a collaborator list; with no username that tier is
/// skipped instead, since no entry could match.
pub fn evaluate(facts: &AccessFacts<'_>) -> Evaluation {
    for tier in ACCESS_POLICY {
        if tier.needs_collaborators() && facts.collaborators.is_none() {
            if facts.username().is_none() {
                continue;
            }
            return Evaluation::NeedsCollaborators;
        }
        if tier.matches(facts) {
            return Evaluation::Decided(tier.outcome());
        }
    }
    Evaluation::Decided(AccessDecision::DENIED)
}

/// Exact-name collaborator holding READ or WRITE.
pub fn has_read_access(collaborators: &[Collaborator], username: &str) -> bool {
    collaborators
        .iter()
        .any(|c| c.matches(username) && c.access_right.can_read())
}

/// Exact-name collaborator holding WRITE. Gates mutations in the UI; not
/// part of the navigation decision.
pub fn has_write_access(collaborators: &[Collaborator], username: &str) -> bool {
    collaborators
        .iter()
        .any(|c| c.matches(username) && c.access_right.can_write())
}
