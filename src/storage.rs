//! Storage Module
//!
//! Small JSON file store rooted in the app's private data directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

/// File-backed key/value storage; one `<key>.json` per entry
#[derive(Debug, Clone)]
pub struct Storage {
    storage_path: PathBuf,
}

impl Storage {
    /// Open storage rooted at `storage_path`, creating the directory if needed
    pub fn open(storage_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let storage_path = storage_path.into();
        std::fs::create_dir_all(&storage_path).map_err(|e| StorageError::Io(e.to_string()))?;

        debug!("Storage initialized at: {:?}", storage_path);
        Ok(Self { storage_path })
    }

    /// Save a value under `key`, replacing any previous value
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<(), StorageError> {
        let json =
            serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let file_path = self.path_for(key);
        let mut file = private_file(&file_path).map_err(|e| StorageError::Io(e.to_string()))?;
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageError::Io(e.to_string()))?;

        info!("Saved data for key: {}", key);
        Ok(())
    }

    /// Load the value stored under `key`, or `None` if nothing was saved
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let file_path = self.path_for(key);

        let bytes = match std::fs::read(&file_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Delete stored data; deleting a missing key is not an error
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        let file_path = self.path_for(key);

        if file_path.exists() {
            std::fs::remove_file(&file_path).map_err(|e| StorageError::Io(e.to_string()))?;
            info!("Deleted stored data for key: {}", key);
        }

        Ok(())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.storage_path.join(format!("{}.json", key))
    }
}

#[cfg(unix)]
fn private_file(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn private_file(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::create(path)
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        name: String,
        count: u32,
    }

    #[test]
    fn missing_key_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let loaded: Option<Entry> = storage.load("absent").unwrap();
        assert!(loaded.is_none());
        assert!(!storage.exists("absent"));
        storage.delete("absent").unwrap();
    }

    #[test]
    fn save_overwrites_and_delete_removes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("nested")).unwrap();

        storage.save("entry", &Entry { name: "a".into(), count: 1 }).unwrap();
        storage.save("entry", &Entry { name: "b".into(), count: 2 }).unwrap();

        let loaded: Entry = storage.load("entry").unwrap().unwrap();
        assert_eq!(loaded, Entry { name: "b".into(), count: 2 });

        storage.delete("entry").unwrap();
        assert!(!storage.exists("entry"));
    }

    #[test]
    fn corrupt_entry_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("entry.json"), b"{not json").unwrap();

        let result: Result<Option<Entry>, _> = storage.load("entry");
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }

    #[cfg(unix)]
    #[test]
    fn saved_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        storage.save("entry", &Entry { name: "a".into(), count: 1 }).unwrap();

        let mode = std::fs::metadata(dir.path().join("entry.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
