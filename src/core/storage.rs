//! Local persisted state: one JSON file of keyed values

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::core::errors::Result;

/// Write-through JSON key-value store.
///
/// Loads the whole file once on open and rewrites it on every `set`. Values
/// are independent JSON documents keyed by name; a key that fails to
/// deserialize is treated as absent rather than an error, so a schema change
/// never bricks the state file.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    state: RwLock<Map<String, Value>>,
}

impl JsonStore {
    /// Open the store, reading the existing file if there is one
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("State file {} is corrupt, starting fresh: {}", path.display(), e);
                Map::new()
            }),
            Err(_) => Map::new(),
        };
        Self {
            path,
            state: RwLock::new(state),
        }
    }

    /// Read a value; absent or undecodable keys yield `None`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.read_state();
        state
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Store a value and rewrite the state file
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let serialized = serde_json::to_value(value)?;
        let content = {
            let mut state = self.write_state();
            state.insert(key.to_string(), serialized);
            serde_json::to_string_pretty(&*state)?
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = JsonStore::open(&path);
        assert_eq!(store.get::<Vec<u64>>("durations"), None);

        store.set("durations", &vec![100u64, 200]).unwrap();
        assert_eq!(store.get::<Vec<u64>>("durations"), Some(vec![100, 200]));

        // a fresh handle sees the persisted data
        let reopened = JsonStore::open(&path);
        assert_eq!(reopened.get::<Vec<u64>>("durations"), Some(vec![100, 200]));
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonStore::open(&path);
        assert_eq!(store.get::<u32>("anything"), None);
        store.set("anything", &1u32).unwrap();
        assert_eq!(store.get::<u32>("anything"), Some(1));
    }

    #[test]
    fn test_undecodable_key_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("state.json"));
        store.set("key", &"a string").unwrap();
        assert_eq!(store.get::<u32>("key"), None);
    }
}
