// Durable key/value storage.
// Persists JSON strings under fixed keys, one file per key, written atomically.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ExplorerError, Result};

use super::paths::{storage_dir, storage_file_name};

/// Minimal durable key/value store for session state such as favorites.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-backed store, one `<key>.json` file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at the platform data directory.
    pub fn from_default_dir() -> Result<Self> {
        storage_dir()
            .map(Self::new)
            .ok_or_else(|| ExplorerError::Config("no home directory for storage".to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(storage_file_name(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)?;
        Ok(Some(contents))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);

        // Write atomically via temp file
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Ephemeral store for tests and sessions without a writable home directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_roundtrip_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("nested"));

        assert_eq!(store.get("favorites").unwrap(), None);

        store.set("favorites", "[]").unwrap();
        assert_eq!(store.get("favorites").unwrap(), Some("[]".to_string()));
        assert!(temp_dir.path().join("nested/favorites.json").exists());

        store.set("favorites", "[1]").unwrap();
        assert_eq!(store.get("favorites").unwrap(), Some("[1]".to_string()));

        store.remove("favorites").unwrap();
        assert_eq!(store.get("favorites").unwrap(), None);
        // Removing a missing key is fine
        store.remove("favorites").unwrap();
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.set("github_token", "abc").unwrap();
        assert_eq!(store.get("github_token").unwrap(), Some("abc".to_string()));
        store.remove("github_token").unwrap();
        assert_eq!(store.get("github_token").unwrap(), None);
    }

    #[test]
    fn test_default_store_lives_in_data_dir() {
        if let Ok(store) = FileStore::from_default_dir() {
            assert!(store.root().ends_with("storage"));
            assert_eq!(Some(store.root().to_path_buf()), storage_dir());
        }
    }
}
