//! Credential persistence for the channel session.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::debug;

use crate::{ChannelError, ChannelResult, SessionCredentials};

/// Stores the opaque channel credential blob between process runs.
pub trait CredentialStore: Send + Sync {
    /// Load persisted credentials, if any.
    fn load(&self) -> ChannelResult<Option<SessionCredentials>>;

    /// Persist credentials, replacing any previous blob.
    fn save(&self, credentials: &SessionCredentials) -> ChannelResult<()>;

    /// Remove persisted credentials.
    fn clear(&self) -> ChannelResult<()>;
}

/// File-backed credential store.
///
/// Writes are atomic (temp file in the same directory, then rename) so a
/// crash mid-save never leaves a truncated blob behind.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store backed by the given file.
    ///
    /// Fails if the parent directory cannot be created; an unusable store
    /// is a startup configuration error, not a per-delivery one.
    pub fn new(path: PathBuf) -> ChannelResult<Self> {
        let parent = path.parent().ok_or_else(|| {
            ChannelError::Credentials(format!(
                "credential path has no parent directory: {}",
                path.display()
            ))
        })?;
        fs::create_dir_all(parent)?;
        Ok(Self { path })
    }

    fn atomic_write(&self, content: &str) -> std::io::Result<()> {
        // Parent existence was checked in the constructor.
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("channel.json");

        let tmp_name = format!(
            ".{}.tavola.tmp.{}",
            file_name,
            std::time::SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let tmp_path = dir.join(tmp_name);

        let write_result = (|| -> std::io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
            }

            fs::rename(&tmp_path, &self.path)?;
            Ok(())
        })();

        if let Err(err) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> ChannelResult<Option<SessionCredentials>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let credentials: SessionCredentials = serde_json::from_str(&content)?;
        Ok(Some(credentials))
    }

    fn save(&self, credentials: &SessionCredentials) -> ChannelResult<()> {
        let content = serde_json::to_string_pretty(credentials)?;
        self.atomic_write(&content)?;
        debug!(path = %self.path.display(), "persisted channel credentials");
        Ok(())
    }

    fn clear(&self) -> ChannelResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> FileCredentialStore {
        FileCredentialStore::new(dir.join("credentials").join("channel.json")).unwrap()
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let creds = SessionCredentials::new(serde_json::json!({"token": "t-1"}));
        store.save(&creds).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, creds);
    }

    #[test]
    fn test_save_overwrites_previous_blob() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .save(&SessionCredentials::new(serde_json::json!({"token": "old"})))
            .unwrap();
        store
            .save(&SessionCredentials::new(serde_json::json!({"token": "new"})))
            .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.payload["token"], "new");
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .save(&SessionCredentials::new(serde_json::json!({"token": "t"})))
            .unwrap();
        store.clear().unwrap();
        store.clear().unwrap();

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_blob_is_an_error() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        fs::write(dir.path().join("credentials").join("channel.json"), "{not json").unwrap();

        assert!(store.load().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .save(&SessionCredentials::new(serde_json::json!({"token": "t"})))
            .unwrap();

        let mode = fs::metadata(dir.path().join("credentials").join("channel.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .save(&SessionCredentials::new(serde_json::json!({"token": "t"})))
            .unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path().join("credentials"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["channel.json".to_string()]);
    }
}
