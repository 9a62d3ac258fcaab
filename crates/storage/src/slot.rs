//! Scope guard over an acquired storage slot

use std::path::Path;

use runtime_core::{Error, Result};
use tracing::{debug, error};

use crate::backend::{SlotHandle, StorageManagerHandle};

/// An acquired slot that is released exactly once.
///
/// Call [`StorageSlot::release`] to observe cleanup errors; a slot that is
/// dropped unreleased is released on drop and failures are logged.
pub struct StorageSlot {
    manager: StorageManagerHandle,
    handle: SlotHandle,
    released: bool,
}

impl StorageSlot {
    /// Acquire a new slot from the manager
    pub fn acquire(manager: StorageManagerHandle) -> Result<Self> {
        let handle = manager.acquire()?;
        debug!(storage_id = %handle.storage_id, path = %handle.path.display(), "Storage slot acquired");
        Ok(Self {
            manager,
            handle,
            released: false,
        })
    }

    pub fn storage_id(&self) -> &str {
        &self.handle.storage_id
    }

    pub fn path(&self) -> &Path {
        &self.handle.path
    }

    pub fn handle(&self) -> &SlotHandle {
        &self.handle
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the slot.
    ///
    /// A second call returns `SlotAlreadyReleased` without touching the
    /// manager.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Err(Error::SlotAlreadyReleased {
                storage_id: self.handle.storage_id.clone(),
            });
        }
        self.released = true;
        self.manager.release(&self.handle)?;
        debug!(storage_id = %self.handle.storage_id, "Storage slot released");
        Ok(())
    }

    /// Release the slot, treating "nothing left to release" as success
    pub fn release_quietly(&mut self) -> Result<()> {
        match self.release() {
            Err(e) if e.is_nothing_to_release() => Ok(()),
            other => other,
        }
    }
}

impl Drop for StorageSlot {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release_quietly() {
            error!(
                storage_id = %self.handle.storage_id,
                error = %e,
                "Failed to release storage slot on drop"
            );
        }
    }
}

impl std::fmt::Debug for StorageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSlot")
            .field("handle", &self.handle)
            .field("released", &self.released)
            .finish()
    }
}
