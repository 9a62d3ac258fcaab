//! Shared filesystem storage manager
//!
//! Every slot is a fresh directory named by its storage id under a common
//! root. Nothing has to be uploaded on release; the manager only tracks
//! which slots are still outstanding.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use runtime_core::config::StorageConfig;
use runtime_core::{Error, Result};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::backend::{SlotHandle, StorageManager};

/// Shared filesystem storage manager
#[derive(Debug)]
pub struct SharedFsStorage {
    /// Root directory holding one subdirectory per artifact
    base_path: PathBuf,

    /// Storage ids acquired but not yet released
    outstanding: Mutex<HashSet<String>>,
}

impl SharedFsStorage {
    /// Create a new SharedFsStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Directory to use as the storage root
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            outstanding: Mutex::new(HashSet::new()),
        }
    }

    /// Create a manager rooted at the configured base path
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.base_path)
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of acquired slots that have not been released
    pub fn outstanding_slots(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Resolve a storage id to its directory
    fn resolve_path(&self, storage_id: &str) -> PathBuf {
        self.base_path.join(storage_id)
    }
}

impl StorageManager for SharedFsStorage {
    #[instrument(skip(self), fields(backend = "shared_fs"))]
    fn acquire(&self) -> Result<SlotHandle> {
        let storage_id = Uuid::new_v4().to_string();
        let path = self.resolve_path(&storage_id);

        fs::create_dir_all(&path).map_err(|e| Error::Storage {
            message: format!("Failed to create directory {:?}: {}", path, e),
        })?;

        self.outstanding.lock().insert(storage_id.clone());
        debug!(%storage_id, ?path, "Slot directory created");

        Ok(SlotHandle { storage_id, path })
    }

    #[instrument(skip(self, handle), fields(backend = "shared_fs", storage_id = %handle.storage_id))]
    fn release(&self, handle: &SlotHandle) -> Result<()> {
        if !self.outstanding.lock().remove(&handle.storage_id) {
            return Err(Error::SlotAlreadyReleased {
                storage_id: handle.storage_id.clone(),
            });
        }
        debug!("Slot released, files stay in place");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "shared_fs"))]
    fn restore_path(&self, storage_id: &str) -> Result<PathBuf> {
        let path = self.resolve_path(storage_id);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(Error::StoragePathNotFound {
                path: path.to_string_lossy().to_string(),
            })
        }
    }

    #[instrument(skip(self), fields(backend = "shared_fs"))]
    fn delete(&self, storage_id: &str) -> Result<()> {
        let path = self.resolve_path(storage_id);
        debug!(?path, "Deleting stored artifact");

        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: path.to_string_lossy().to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to delete {}: {}", storage_id, e),
            }),
        }
    }
}
