//! Application context for CLI command execution.
//!
//! `App` discovers the repository root, loads configuration, and opens the
//! configured storage backend. Commands go through it so storage lifecycle
//! (open, mutate, save) stays in one place.

use crate::config::{find_girder_root, GirderConfig, CONFIG_FILE_NAME, GIRDER_DIR_NAME};
use crate::error::{Error, Result};
use crate::storage::{create_store, WorkItemStore};
use std::path::{Path, PathBuf};

/// Application context for CLI operations.
pub struct App {
    /// The storage backend.
    storage: Box<dyn WorkItemStore>,

    /// Path to the `.girder` directory.
    girder_dir: PathBuf,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("girder_dir", &self.girder_dir)
            .field("storage", &"<dyn WorkItemStore>")
            .finish()
    }
}

impl App {
    /// Create an App from the given working directory.
    ///
    /// Walks up to find the repository, loads its config, and opens storage.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when no repository is found, and storage
    /// errors when the snapshot cannot be opened.
    pub async fn from_directory(working_dir: &Path) -> Result<Self> {
        let root = find_girder_root(working_dir).ok_or_else(|| {
            Error::Config("not a girder repository (run `girder init` first)".to_string())
        })?;

        let girder_dir = root.join(GIRDER_DIR_NAME);
        let config = GirderConfig::load(&girder_dir.join(CONFIG_FILE_NAME)).await?;
        let backend = config.to_backend(&girder_dir)?;
        let storage = create_store(backend).await?;

        Ok(Self {
            storage,
            girder_dir,
        })
    }

    /// Mutable access to storage.
    pub fn storage_mut(&mut self) -> &mut dyn WorkItemStore {
        self.storage.as_mut()
    }

    /// Shared access to storage.
    pub fn storage(&self) -> &dyn WorkItemStore {
        self.storage.as_ref()
    }

    /// Path to the `.girder` directory.
    pub fn girder_dir(&self) -> &Path {
        &self.girder_dir
    }

    /// Persist storage state. Call after mutating operations.
    pub async fn save(&self) -> Result<()> {
        self.storage.save().await
    }
}
