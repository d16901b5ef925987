//! Navigation guard run before every protected view.
//!
//! `routes` maps paths to views and extracts board ids; `navigation` walks
//! the access and session checks and produces a router decision.

pub mod navigation;
pub mod routes;

pub use navigation::{
    GuardOutcome, NavigationDecision, NavigationGuard, NavigationTicket, NavigationTracker,
    DEFAULT_LANDING_PATH,
};
pub use routes::{
    match_route, NavigationTarget, RouteMatch, RouteName, ACCESS_DENIED_PATH, LOGIN_PATH,
    NOT_FOUND_PATH, ROUTES,
};
