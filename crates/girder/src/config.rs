//! Repository configuration and initialization.
//!
//! A girder repository is a `.girder/` directory holding a `config.yaml` and
//! the JSONL snapshot file. Like a VCS root, the directory is discovered by
//! walking up from the working directory.

use crate::error::{Error, Result};
use crate::storage::StoreBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Name of the girder directory.
pub const GIRDER_DIR_NAME: &str = ".girder";

/// Name of the configuration file inside [`GIRDER_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default name of the snapshot data file.
pub const DATA_FILE_NAME: &str = "tracker.jsonl";

/// Maximum directory depth to traverse when searching for the girder root.
const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GirderConfig {
    /// Storage configuration.
    pub storage: StorageConfig,
}

/// Storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Storage backend type: "jsonl" (persistent) or "memory" (ephemeral).
    pub backend: String,

    /// Snapshot file name, relative to the `.girder` directory.
    pub data_file: String,
}

impl GirderConfig {
    /// Load configuration from a file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Resolve the configured backend against the girder directory.
    pub fn to_backend(&self, girder_dir: &Path) -> Result<StoreBackend> {
        match self.storage.backend.as_str() {
            "jsonl" => Ok(StoreBackend::Jsonl(girder_dir.join(&self.storage.data_file))),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(Error::Config(format!("unknown storage backend: {other}"))),
        }
    }
}

impl Default for GirderConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: "jsonl".to_string(),
                data_file: DATA_FILE_NAME.to_string(),
            },
        }
    }
}

/// Find the directory containing `.girder/`, walking up from `start`.
pub fn find_girder_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    for _ in 0..MAX_TRAVERSAL_DEPTH {
        if current.join(GIRDER_DIR_NAME).is_dir() {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
    None
}

/// Initialize a girder repository in `base_dir`.
///
/// Creates `.girder/` with a default config and an empty snapshot file.
///
/// # Errors
///
/// Returns `Error::Config` if the directory is already initialized.
pub async fn init(base_dir: &Path) -> Result<PathBuf> {
    let girder_dir = base_dir.join(GIRDER_DIR_NAME);
    if girder_dir.exists() {
        return Err(Error::Config(format!(
            "already initialized: found existing {GIRDER_DIR_NAME}"
        )));
    }

    fs::create_dir_all(&girder_dir).await?;

    let config = GirderConfig::default();
    config.save(&girder_dir.join(CONFIG_FILE_NAME)).await?;
    fs::write(girder_dir.join(DATA_FILE_NAME), "").await?;

    Ok(girder_dir)
}
