//! Storage - Two-phase checkpoint storage for training workers
//!
//! Provides:
//! - The [`StorageManager`] acquire/release contract
//! - [`StorageSlot`], a guard that releases its slot exactly once
//! - A shared filesystem manager
//! - Resource manifests listing what a checkpoint wrote
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use storage::{SharedFsStorage, StorageMetadata, StorageSlot};
//!
//! # fn example() -> runtime_core::Result<()> {
//! let manager = Arc::new(SharedFsStorage::new("/mnt/checkpoints"));
//! let mut slot = StorageSlot::acquire(manager)?;
//! std::fs::write(slot.path().join("model.bin"), [1, 2, 3])?;
//! let metadata = StorageMetadata::from_slot(slot.handle())?;
//! slot.release()?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod local;
mod manifest;
mod slot;

pub use backend::{SlotHandle, StorageManager, StorageManagerHandle};
pub use local::SharedFsStorage;
pub use manifest::{list_resources, Resources, StorageMetadata};
pub use slot::StorageSlot;
