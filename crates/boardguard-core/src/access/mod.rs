//! Board access resolution.
//!
//! `policy` holds the ordered tiers (forbidden, not found, public, owner,
//! collaborator) as pure predicates; `resolver` feeds them remote state and
//! turns every lookup failure into a conservative decision.

pub mod policy;
pub mod resolver;

pub use policy::{
    evaluate, has_read_access, has_write_access, AccessDecision, AccessFacts, AccessTier,
    BoardLookup, Evaluation, ACCESS_POLICY,
};
pub use resolver::{AccessResolution, AccessResolver};
