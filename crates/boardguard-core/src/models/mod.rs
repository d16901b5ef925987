//! Data models for board entities.
//!
//! These mirror what the remote board service returns. The guard only
//! reads them; it never creates or mutates boards itself.
//!
//! - `Board`, `BoardOwner`, `Visibility`: board metadata used for access checks
//! - `Collaborator`, `AccessRight`: per-board collaborator grants
//! - `TaskSummary`: task rows shown on a board view

pub mod board;
pub mod collaborator;
pub mod task;

pub use board::{Board, BoardOwner, Visibility};
pub use collaborator::{AccessRight, Collaborator};
pub use task::TaskSummary;
