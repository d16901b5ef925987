use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum Visibility {
    #[serde(rename = "public", alias = "PUBLIC")]
    Public,
    /// Boards that omit visibility are treated as private.
    #[default]
    #[serde(rename = "private", alias = "PRIVATE")]
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct BoardOwner {
    #[serde(default)]
    pub oid: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Board {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub owner: BoardOwner,
    #[serde(default)]
    pub visibility: Visibility,
}

impl Board {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Exact match against the owner's name after trimming both sides.
    pub fn is_owned_by(&self, username: &str) -> bool {
        let owner = self.owner.name.trim();
        !owner.is_empty() && owner == username.trim()
    }
}
