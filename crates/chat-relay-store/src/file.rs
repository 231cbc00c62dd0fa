//! File-backed storage implementation.
//!
//! Each key maps to `<dir>/<key>.json`. Writes go to a temporary sibling file
//! that is then renamed over the target, so a crash mid-write never leaves a
//! truncated value behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::KeyValueStorage;

/// Storage that keeps one file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory holding the stored values.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (FileStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().join("history")).unwrap();
        (storage, dir)
    }

    #[test]
    fn value_crud() {
        let (storage, _dir) = create_test_storage();

        assert_eq!(storage.get("chat-history").unwrap(), None);

        storage.set("chat-history", "[]").unwrap();
        assert_eq!(storage.get("chat-history").unwrap().as_deref(), Some("[]"));
        assert!(storage.dir().join("chat-history.json").exists());

        storage.set("chat-history", "[1]").unwrap();
        assert_eq!(storage.get("chat-history").unwrap().as_deref(), Some("[1]"));

        storage.remove("chat-history").unwrap();
        assert_eq!(storage.get("chat-history").unwrap(), None);
        storage.remove("chat-history").unwrap();
    }

    #[test]
    fn no_temp_file_left_behind() {
        let (storage, _dir) = create_test_storage();
        storage.set("k", "v").unwrap();
        let names: Vec<_> = fs::read_dir(storage.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["k.json".to_string()]);
    }

    #[test]
    fn path_like_keys_rejected() {
        let (storage, _dir) = create_test_storage();
        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(
                matches!(storage.set(key, "x"), Err(StoreError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        FileStorage::open(dir.path()).unwrap().set("k", "v").unwrap();
        let reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }
}
