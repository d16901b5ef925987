use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Session file name in the cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Access,
    Refresh,
}

/// Everything the store holds, read or written as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
}

impl StoredCredentials {
    pub fn get(&self, kind: CredentialKind) -> Option<&str> {
        match kind {
            CredentialKind::Access => self.access_token.as_deref(),
            CredentialKind::Refresh => self.refresh_token.as_deref(),
        }
    }
}

/// Process-wide holder of the credential pair and the signed-in username.
///
/// Implementations must make `clear` remove both credentials and the
/// username in one step, so no reader ever sees half a session.
pub trait CredentialStore: Send + Sync {
    /// Consistent copy of the whole store.
    fn snapshot(&self) -> StoredCredentials;

    fn get(&self, kind: CredentialKind) -> Option<String> {
        self.snapshot().get(kind).map(str::to_string)
    }

    /// Store a credential pair. The username is left as is.
    fn set(&self, access: &str, refresh: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn username(&self) -> Option<String> {
        self.snapshot().username
    }

    fn set_username(&self, username: &str) -> Result<()>;
}

fn read_lock(lock: &RwLock<StoredCredentials>) -> RwLockReadGuard<'_, StoredCredentials> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock(lock: &RwLock<StoredCredentials>) -> RwLockWriteGuard<'_, StoredCredentials> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<StoredCredentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        Self {
            inner: RwLock::new(StoredCredentials {
                access_token: Some(access.to_string()),
                refresh_token: Some(refresh.to_string()),
                username: None,
            }),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn snapshot(&self) -> StoredCredentials {
        read_lock(&self.inner).clone()
    }

    fn set(&self, access: &str, refresh: &str) -> Result<()> {
        let mut guard = write_lock(&self.inner);
        guard.access_token = Some(access.to_string());
        guard.refresh_token = Some(refresh.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *write_lock(&self.inner) = StoredCredentials::default();
        Ok(())
    }

    fn set_username(&self, username: &str) -> Result<()> {
        write_lock(&self.inner).username = Some(username.to_string());
        Ok(())
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// Keeps the pair in memory and writes it through to `session.json`.
pub struct FileCredentialStore {
    path: PathBuf,
    inner: RwLock<StoredCredentials>,
}

impl FileCredentialStore {
    /// Open the store in `cache_dir`, loading any saved session.
    /// A half-written pair on disk is discarded.
    pub fn open(cache_dir: &Path) -> Result<Self> {
        let path = cache_dir.join(SESSION_FILE);
        let mut data = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read session file")?;
            serde_json::from_str::<StoredCredentials>(&contents)
                .context("Failed to parse session file")?
        } else {
            StoredCredentials::default()
        };

        if data.access_token.is_none() != data.refresh_token.is_none() {
            debug!("Discarding incomplete credential pair");
            data = StoredCredentials::default();
        }

        Ok(Self {
            path,
            inner: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &StoredCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn snapshot(&self) -> StoredCredentials {
        read_lock(&self.inner).clone()
    }

    fn set(&self, access: &str, refresh: &str) -> Result<()> {
        let mut guard = write_lock(&self.inner);
        guard.access_token = Some(access.to_string());
        guard.refresh_token = Some(refresh.to_string());
        self.persist(&guard)
    }

    fn clear(&self) -> Result<()> {
        let mut guard = write_lock(&self.inner);
        *guard = StoredCredentials::default();
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }

    fn set_username(&self, username: &str) -> Result<()> {
        let mut guard = write_lock(&self.inner);
        guard.username = Some(username.to_string());
        self.persist(&guard)
    }
}
