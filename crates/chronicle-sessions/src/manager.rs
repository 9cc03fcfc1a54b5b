use std::path::PathBuf;

use tokio::fs;
use tracing::{instrument, warn};

use crate::error::Result;
use crate::types::SessionFileKey;

/// Store for opaque per-`(UserId, SourceType)` protocol credential blobs.
///
/// Session files are created on successful pairing and deleted only on
/// explicit logout (`Logout`, not `Destroy`, per the client manager's
/// lifecycle contract). Corrupted or unreadable files are treated as
/// missing rather than surfaced as errors.
pub struct SessionFileStore;

impl SessionFileStore {
    pub fn new() -> Self {
        Self
    }

    /// Read the session blob for `key`, trying `"{base}.user_{id}"` first and
    /// the legacy bare-base path (UserID=1 only) as a fallback.
    ///
    /// Returns `Ok(None)` both when no file exists and when the file exists
    /// but cannot be read — corruption is indistinguishable from absence.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn read(&self, key: &SessionFileKey, base: &str) -> Result<Option<Vec<u8>>> {
        let primary = key.path(base);
        match fs::read(&primary).await {
            Ok(bytes) => return Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %primary, error = %e, "session file unreadable, treating as missing");
                return Ok(None);
            }
        }

        if let Some(legacy) = key.legacy_path(base) {
            match fs::read(legacy).await {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %legacy, error = %e, "legacy session file unreadable, treating as missing");
                }
            }
        }

        Ok(None)
    }

    /// Write the session blob for `key`, creating parent directories as needed
    /// and setting `0600` permissions on Unix.
    #[instrument(skip(self, bytes), fields(key = %key, bytes = bytes.len()))]
    pub async fn write(&self, key: &SessionFileKey, base: &str, bytes: &[u8]) -> Result<()> {
        let path = key.path(base);
        if let Some(parent) = PathBuf::from(&path).parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        set_private_permissions(&path).await;
        Ok(())
    }

    /// Delete the session file. "Not found" is treated as success; any other
    /// I/O failure surfaces as an error.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn delete(&self, key: &SessionFileKey, base: &str) -> Result<()> {
        let path = key.path(base);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a session file exists for `key` (used by `RestoreSessions`).
    pub async fn exists(&self, key: &SessionFileKey, base: &str) -> bool {
        fs::metadata(key.path(base)).await.is_ok()
            || key
                .legacy_path(base)
                .map(|p| std::path::Path::new(p).exists())
                .unwrap_or(false)
    }
}

impl Default for SessionFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn set_private_permissions(path: &str) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = fs::metadata(path).await {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = fs::set_permissions(path, perms).await;
    }
}

#[cfg(not(unix))]
async fn set_private_permissions(_path: &str) {}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::{SourceType, UserId};

    fn tmp_base(name: &str) -> String {
        format!(
            "{}/chronicle-sessions-test-{}-{}",
            std::env::temp_dir().display(),
            name,
            std::process::id()
        )
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = SessionFileStore::new();
        let key = SessionFileKey::new(UserId(7), SourceType::MessengerA);
        let base = tmp_base("roundtrip");

        store.write(&key, &base, b"credential-blob").await.unwrap();
        let read = store.read(&key, &base).await.unwrap();
        assert_eq!(read, Some(b"credential-blob".to_vec()));

        store.delete(&key, &base).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let store = SessionFileStore::new();
        let key = SessionFileKey::new(UserId(99), SourceType::MessengerB);
        let base = tmp_base("missing");
        assert_eq!(store.read(&key, &base).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_missing_file_is_success() {
        let store = SessionFileStore::new();
        let key = SessionFileKey::new(UserId(123), SourceType::Email);
        let base = tmp_base("delete-missing");
        assert!(store.delete(&key, &base).await.is_ok());
    }
}
