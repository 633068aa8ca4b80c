//! Key-value storage backends for the ticket cache and preferences.
//!
//! Values are opaque strings, the same shape a browser's local storage has.

use crate::error::StorageError;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// String key-value storage
pub trait Storage: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value; deleting a missing key is not an error
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Every key currently stored
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory storage, lost on drop
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> T {
        match self.entries.lock() {
            Ok(mut entries) => f(&mut entries),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.with_entries(|entries| entries.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_entries(|entries| entries.insert(key.to_string(), value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entries(|entries| entries.remove(key));
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.with_entries(|entries| entries.keys().cloned().collect()))
    }
}

/// Storage persisted as one JSON object file
///
/// Every write rewrites the whole file through a sibling temp file and a
/// rename, so readers never observe a half-written file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if an existing file cannot be read and
    /// [`StorageError::Corrupt`] if it is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened storage file");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, StorageError> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Memory only changes once the file holds the new contents
        let mut next = entries.clone();
        let result = f(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(result)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, String>) -> T) -> T {
        match self.entries.lock() {
            Ok(entries) => f(&entries),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read(|entries| entries.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read(|entries| entries.keys().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;

    #[test]
    fn test_memory_storage_basic_operations() {
        let storage = MemoryStorage::new();

        storage.set("a", "1").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1"));

        storage.remove("a").unwrap();
        storage.remove("missing").unwrap();
        assert_eq!(storage.get("a").unwrap(), None);
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("walkin.json");

        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set("queue_data_q1", "{}").unwrap();
            storage.set("theme", "light").unwrap();
            storage.remove("theme").unwrap();
        }

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["queue_data_q1".to_string()]);
        assert_eq!(storage.get("queue_data_q1").unwrap().as_deref(), Some("{}"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walkin.json");
        let storage = FileStorage::open(&path).unwrap();
        storage.set("theme", "dark").unwrap();

        // A directory where the temp file goes makes every write fail
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

        assert!(storage.set("theme", "light").is_err());
        assert!(storage.set("soundEnabled", "false").is_err());
        assert!(storage.remove("theme").is_err());

        assert_eq!(storage.get("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(storage.keys().unwrap(), vec!["theme".to_string()]);
        assert_eq!(
            FileStorage::open(&path).unwrap().get("theme").unwrap().as_deref(),
            Some("dark")
        );
    }

    #[test]
    fn test_file_storage_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walkin.json");
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(matches!(FileStorage::open(&path), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_file_storage_treats_empty_file_as_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let storage = FileStorage::open(file.path()).unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }
}
