use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::collection::RecordStore;
use super::error::StoreError;

/// The data directory holding one `<name>.json` file per collection.
///
/// Hands out [`RecordStore`] handles and caches one write lock per
/// collection, so every handle on the same file serializes its writes.
#[derive(Clone, Debug)]
pub struct DataDir {
    root: PathBuf,
    locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl DataDir {
    /// Create the directory if absent. Failure here is fatal for callers.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(&root, e))?;

        Ok(Self {
            root,
            locks: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle on a named collection, sharing the cached lock for that name
    pub async fn collection(&self, name: &str) -> Result<RecordStore, StoreError> {
        if !is_valid_collection_name(name) {
            return Err(StoreError::InvalidCollection(name.to_string()));
        }
        let path = self.root.join(format!("{}.json", name));

        // Fast path: lock already cached
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(name) {
                return Ok(RecordStore::new(name.to_string(), path, lock.clone()));
            }
        }

        let lock = {
            let mut locks = self.locks.write().await;
            locks
                .entry(name.to_string())
                .or_insert_with(|| {
                    info!("Opened collection: {}", name);
                    Arc::new(Mutex::new(()))
                })
                .clone()
        };
        Ok(RecordStore::new(name.to_string(), path, lock))
    }

    /// Names of the collections that currently have a file on disk, sorted
    pub async fn collections(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_collection_name(stem) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Checks the directory is still there and is a directory
    pub async fn health_check(&self) -> Result<(), StoreError> {
        let meta = fs::metadata(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;
        if !meta.is_dir() {
            return Err(StoreError::io(
                &self.root,
                std::io::Error::new(std::io::ErrorKind::Other, "data path is not a directory"),
            ));
        }
        Ok(())
    }
}

/// Collection names map straight to file names: `[A-Za-z0-9_-]+`
fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
