//! Directory-backed durable medium

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::keys::is_valid_key;
use crate::traits::DurableMedium;
use crate::{StorageError, StorageResult};

const TEMP_SUFFIX: &str = "tmp";

/// Durable medium storing one file per key in a directory
///
/// Writes go to a temporary sibling file which is synced and then renamed over
/// the target, so a key always holds either its old or its new contents.
#[derive(Debug, Clone)]
pub struct FileMedium {
    root: PathBuf,
}

impl FileMedium {
    /// Open (and create if needed) the medium directory
    ///
    /// Temporary files left behind by writes interrupted by a power loss are
    /// removed; the previous committed value of their key stays in place.
    ///
    /// # Errors
    /// Returns `MediumUnavailable` if the directory cannot be created or read.
    #[instrument(skip(root), fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root).map_err(|e| {
            StorageError::MediumUnavailable(format!("cannot create {}: {e}", root.display()))
        })?;

        let medium = Self { root };
        medium.check()?;
        medium.sweep_temp_files()?;

        debug!("file medium opened");
        Ok(medium)
    }

    /// Directory backing this medium
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{TEMP_SUFFIX}"))
    }

    fn sweep_temp_files(&self) -> StorageResult<()> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            StorageError::MediumUnavailable(format!("cannot list {}: {e}", self.root.display()))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_SUFFIX) {
                warn!(path = %path.display(), "removing interrupted write");
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove interrupted write");
                }
            }
        }

        Ok(())
    }

    /// Persist the directory entry itself after a rename or unlink
    fn sync_dir(&self, key: &str) -> StorageResult<()> {
        File::open(&self.root)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| StorageError::io(key, &e))
    }
}

impl DurableMedium for FileMedium {
    fn check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).map_err(|e| {
            StorageError::MediumUnavailable(format!("cannot access {}: {e}", self.root.display()))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::MediumUnavailable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(StorageError::MediumUnavailable(format!(
                "{} is read-only",
                self.root.display()
            )));
        }

        Ok(())
    }

    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(key, &e)),
        }
    }

    #[instrument(skip(self, value), fields(len = value.len()), level = "debug")]
    fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let temp_path = self.temp_path_for(key);

        let result = File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(value)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp_path, &path));

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&temp_path)
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!(path = %temp_path.display(), error = %cleanup, "failed to remove temp file");
            }
            return Err(StorageError::io(key, &e));
        }

        self.sync_dir(key)
    }

    #[instrument(skip(self), level = "debug")]
    fn erase(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => self.sync_dir(key),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(key, &e)),
        }
    }

    fn medium_type(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_absent_key() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::open(dir.path()).unwrap();

        assert_eq!(medium.read("auth_keys").unwrap(), None);
        assert!(!medium.contains("auth_keys").unwrap());
    }

    #[test]
    fn test_write_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::open(dir.path()).unwrap();

        medium.write("ota_deployment", b"first").unwrap();
        medium.write("ota_deployment", b"second").unwrap();

        assert_eq!(
            medium.read("ota_deployment").unwrap(),
            Some(b"second".to_vec())
        );
        assert!(!dir.path().join("ota_deployment.tmp").exists());
    }

    #[test]
    fn test_erase_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::open(dir.path()).unwrap();

        medium.write("auth_keys", b"x").unwrap();
        medium.erase("auth_keys").unwrap();
        medium.erase("auth_keys").unwrap();

        assert_eq!(medium.read("auth_keys").unwrap(), None);
    }

    #[test]
    fn test_open_discards_interrupted_write() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("auth_keys"), b"committed").unwrap();
        fs::write(dir.path().join("auth_keys.tmp"), b"torn").unwrap();

        let medium = FileMedium::open(dir.path()).unwrap();

        assert_eq!(medium.read("auth_keys").unwrap(), Some(b"committed".to_vec()));
        assert!(!dir.path().join("auth_keys.tmp").exists());
    }

    #[test]
    fn test_open_on_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("plain");
        fs::write(&not_a_dir, b"").unwrap();

        let err = FileMedium::open(&not_a_dir).unwrap_err();
        assert!(matches!(err, StorageError::MediumUnavailable(_)));
    }

    #[test]
    fn test_rejects_invalid_key() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::open(dir.path()).unwrap();

        let err = medium.write("../escape", b"x").unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
