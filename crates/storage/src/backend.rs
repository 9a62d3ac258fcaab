//! Storage manager trait definition
//!
//! Defines the two-phase interface checkpoint storage must implement:
//! a slot is acquired before a checkpoint is written and released after.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use runtime_core::{Result, StorageId};
use serde::{Deserialize, Serialize};

/// Identity and location of an acquired storage slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotHandle {
    /// Unique identifier of the stored artifact
    pub storage_id: StorageId,

    /// Writable directory for the artifact's files
    pub path: PathBuf,
}

impl SlotHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Two-phase provider of checkpoint storage slots
///
/// Implementors hand out a fresh identifier and writable directory on
/// `acquire`, and perform whatever cleanup or upload the backend needs on
/// `release`.
pub trait StorageManager: Send + Sync {
    /// Allocate a new slot
    ///
    /// # Returns
    /// A handle carrying the new storage id and its writable directory
    ///
    /// # Errors
    /// Returns error if the slot's directory cannot be created
    fn acquire(&self) -> Result<SlotHandle>;

    /// Finish the slot's lifecycle
    ///
    /// # Errors
    /// Returns `SlotAlreadyReleased` when there is nothing left to clean up
    /// for this handle; any other error means cleanup failed.
    fn release(&self, handle: &SlotHandle) -> Result<()>;

    /// Locate the files of a previously stored artifact
    ///
    /// # Errors
    /// Returns `StoragePathNotFound` if no artifact has that id
    fn restore_path(&self, storage_id: &str) -> Result<PathBuf>;

    /// Remove a previously stored artifact
    ///
    /// # Errors
    /// Returns `StoragePathNotFound` if no artifact has that id
    fn delete(&self, storage_id: &str) -> Result<()>;
}

/// Thread-safe handle to a storage manager
pub type StorageManagerHandle = Arc<dyn StorageManager>;
