use serde::{Deserialize, Serialize};

/// A task row as listed on a board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct TaskSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub assignees: Option<String>,
    #[serde(default, alias = "statusName")]
    pub status: Option<String>,
}

impl TaskSummary {
    pub fn display_assignees(&self) -> &str {
        match self.assignees.as_deref() {
            Some(a) if !a.trim().is_empty() => a,
            _ => "Unassigned",
        }
    }

    pub fn display_status(&self) -> &str {
        self.status.as_deref().unwrap_or("No Status")
    }
}
