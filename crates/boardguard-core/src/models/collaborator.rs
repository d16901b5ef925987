use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum AccessRight {
    #[serde(rename = "READ")]
    Read,
    #[serde(rename = "WRITE")]
    Write,
    /// Any right the service adds later. Never grants anything.
    #[serde(other)]
    Unknown,
}

impl AccessRight {
    pub fn can_read(self) -> bool {
        matches!(self, AccessRight::Read | AccessRight::Write)
    }

    pub fn can_write(self) -> bool {
        self == AccessRight::Write
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Collaborator {
    #[serde(default)]
    pub oid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "access_right", alias = "accessRight")]
    pub access_right: AccessRight,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub added_on: Option<DateTime<Utc>>,
}

impl Collaborator {
    pub fn new(name: impl Into<String>, access_right: AccessRight) -> Self {
        Self {
            oid: None,
            name: name.into(),
            email: None,
            access_right,
            added_on: None,
        }
    }

    pub fn matches(&self, username: &str) -> bool {
        let name = self.name.trim();
        !name.is_empty() && name == username.trim()
    }
}
