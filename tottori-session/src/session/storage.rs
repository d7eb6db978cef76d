//! Token Storage - durable mirror of the session tokens
//!
//! Two slots, `token` and `refreshToken`. The session manager writes them
//! right after every in-memory token change and reads them once at startup.

use crate::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Contents of the two storage slots
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    #[serde(rename = "token", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(
        rename = "refreshToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,
}

impl StoredTokens {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl std::fmt::Debug for StoredTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTokens")
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Durable token mirror
///
/// Calls are synchronous so a mirror write can happen in the same critical
/// section as the in-memory change it reflects.
pub trait TokenStore: Send + Sync {
    /// Read both slots; missing storage yields empty slots
    fn load(&self) -> SessionResult<StoredTokens>;

    /// Overwrite both slots; a `None` slot is removed
    fn save(&self, tokens: &StoredTokens) -> SessionResult<()>;

    /// Remove both slots
    fn clear(&self) -> SessionResult<()>;
}

/// Token store backed by a JSON file
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, content: &str) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::storage_with_source(
                    format!("Failed to create {}", parent.display()),
                    Box::new(e),
                )
            })?;
        }

        let write_error = |e: std::io::Error| {
            SessionError::storage_with_source(
                format!("Failed to write {}", self.path.display()),
                Box::new(e),
            )
        };

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).map_err(write_error)?;

        // `mode` only applies to new files; tighten an existing one before
        // any token lands in it.
        #[cfg(unix)]
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(write_error)?;

        file.write_all(content.as_bytes()).map_err(write_error)?;
        file.sync_all().map_err(write_error)?;

        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> SessionResult<StoredTokens> {
        if !self.path.exists() {
            return Ok(StoredTokens::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            SessionError::storage_with_source(
                format!("Failed to read {}", self.path.display()),
                Box::new(e),
            )
        })?;

        if content.trim().is_empty() {
            return Ok(StoredTokens::default());
        }

        let tokens: StoredTokens = serde_json::from_str(&content).map_err(|e| {
            SessionError::storage_with_source(
                format!("Corrupt token file {}", self.path.display()),
                Box::new(e),
            )
        })?;

        debug!("Loaded tokens from {}", self.path.display());
        Ok(tokens)
    }

    fn save(&self, tokens: &StoredTokens) -> SessionResult<()> {
        if tokens.is_empty() {
            return self.clear();
        }

        let content = serde_json::to_string_pretty(tokens)?;
        self.write_file(&content)?;

        debug!("Saved tokens to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> SessionResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed token file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::storage_with_source(
                format!("Failed to remove {}", self.path.display()),
                Box::new(e),
            )),
        }
    }
}

/// In-process token store, for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with tokens, as if left behind by an earlier run
    pub fn with_tokens(access_token: Option<&str>, refresh_token: Option<&str>) -> Self {
        Self {
            tokens: Mutex::new(StoredTokens::new(
                access_token.map(str::to_string),
                refresh_token.map(str::to_string),
            )),
        }
    }

    /// Current slot contents
    pub fn tokens(&self) -> StoredTokens {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> SessionResult<StoredTokens> {
        Ok(self.tokens())
    }

    fn save(&self, tokens: &StoredTokens) -> SessionResult<()> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = tokens.clone();
        Ok(())
    }

    fn clear(&self) -> SessionResult<()> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = StoredTokens::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(access: &str, refresh: Option<&str>) -> StoredTokens {
        StoredTokens::new(Some(access.to_string()), refresh.map(str::to_string))
    }

    #[test]
    fn test_slot_names() {
        let json = serde_json::to_value(tokens("T1", Some("R1"))).unwrap();
        assert_eq!(json, serde_json::json!({"token": "T1", "refreshToken": "R1"}));

        let json = serde_json::to_value(tokens("T1", None)).unwrap();
        assert_eq!(json, serde_json::json!({"token": "T1"}));
    }

    #[test]
    fn test_file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("session.json"));

        assert!(store.load().unwrap().is_empty());

        store.save(&tokens("T1", Some("R1"))).unwrap();
        assert_eq!(store.load().unwrap(), tokens("T1", Some("R1")));

        store.save(&tokens("T2", Some("R1"))).unwrap();
        assert_eq!(store.load().unwrap(), tokens("T2", Some("R1")));

        store.clear().unwrap();
        assert!(!store.path().exists());
        assert!(store.load().unwrap().is_empty());

        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_saving_empty_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("session.json"));

        store.save(&tokens("T1", None)).unwrap();
        assert!(store.path().exists());

        store.save(&StoredTokens::default()).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileTokenStore::new(&path);
        assert!(matches!(store.load(), Err(SessionError::Storage { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("session.json"));
        store.save(&tokens("T1", Some("R1"))).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_readable_token_file_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileTokenStore::new(&path);
        store.save(&tokens("T1", Some("R1"))).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().unwrap(), tokens("T1", Some("R1")));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTokenStore::with_tokens(Some("T1"), None);
        assert_eq!(store.load().unwrap(), tokens("T1", None));

        store.save(&tokens("T2", Some("R2"))).unwrap();
        assert_eq!(store.tokens(), tokens("T2", Some("R2")));

        store.clear().unwrap();
        assert!(store.tokens().is_empty());
    }

    #[test]
    fn test_debug_hides_tokens() {
        let printed = format!("{:?}", tokens("secret-access", Some("secret-refresh")));
        assert!(!printed.contains("secret"));
    }
}
