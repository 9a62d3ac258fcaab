//! Resource manifests describing the files of a stored artifact

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use runtime_core::{Error, Result, StorageId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::SlotHandle;

/// Relative path -> size in bytes. Directories end in `/` and have size 0.
pub type Resources = BTreeMap<String, u64>;

/// Storage id plus the manifest of everything written under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMetadata {
    #[serde(rename = "uuid")]
    pub storage_id: StorageId,
    pub resources: Resources,
}

impl StorageMetadata {
    /// Build the manifest for the files currently in a slot
    pub fn from_slot(handle: &SlotHandle) -> Result<Self> {
        Ok(Self {
            storage_id: handle.storage_id.clone(),
            resources: list_resources(&handle.path)?,
        })
    }

    /// Total bytes across all files
    pub fn total_size(&self) -> u64 {
        self.resources.values().sum()
    }
}

/// Recursively list a directory into a manifest keyed by relative path
pub fn list_resources(root: &Path) -> Result<Resources> {
    if !root.is_dir() {
        return Err(Error::StoragePathNotFound {
            path: root.to_string_lossy().to_string(),
        });
    }

    let mut resources = Resources::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let entry_path = entry.path();
            let metadata = entry.metadata()?;

            let relative = match entry_path.strip_prefix(root) {
                Ok(relative) => relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
                Err(_) => continue,
            };

            if metadata.is_dir() {
                resources.insert(format!("{}/", relative), 0);
                stack.push(entry_path);
            } else if metadata.is_file() {
                resources.insert(relative, metadata.len());
            }
        }
    }

    debug!(root = %root.display(), count = resources.len(), "Listed resources");
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_resources() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("model.bin"), vec![0u8; 128]).unwrap();
        fs::create_dir_all(root.join("optimizer/state")).unwrap();
        fs::write(root.join("optimizer/state/adam.bin"), vec![0u8; 64]).unwrap();

        let resources = list_resources(root).unwrap();
        assert_eq!(resources.get("model.bin"), Some(&128));
        assert_eq!(resources.get("optimizer/"), Some(&0));
        assert_eq!(resources.get("optimizer/state/"), Some(&0));
        assert_eq!(resources.get("optimizer/state/adam.bin"), Some(&64));
        assert_eq!(resources.len(), 4);
    }

    #[test]
    fn test_list_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = list_resources(&temp_dir.path().join("missing"));
        assert!(matches!(result, Err(Error::StoragePathNotFound { .. })));
    }

    #[test]
    fn test_metadata_wire_shape() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.bin"), b"12345").unwrap();
        let handle = SlotHandle {
            storage_id: "ckpt-1".to_string(),
            path: temp_dir.path().to_path_buf(),
        };

        let metadata = StorageMetadata::from_slot(&handle).unwrap();
        assert_eq!(metadata.total_size(), 5);

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["uuid"], "ckpt-1");
        assert_eq!(json["resources"]["a.bin"], 5);
    }
}
