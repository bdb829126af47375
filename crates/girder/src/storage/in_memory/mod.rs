//! In-memory storage backend with optional JSONL snapshot persistence.
//!
//! All data lives in RAM: `HashMap`s for entity lookup plus one
//! `petgraph::stable_graph::StableDiGraph` holding every relation edge,
//! with dependency and membership edges discriminated by edge weight.
//! Stable indices mean deleting an item never invalidates the id→node map.
//!
//! # Persistence
//!
//! A store opened with [`InMemoryStore::open_jsonl`] remembers its snapshot
//! path: `save()` atomically rewrites the file and `reload()` rebuilds state
//! from it. A store created with [`InMemoryStore::new`] is ephemeral and both
//! are no-ops.
//!
//! # Thread safety
//!
//! The handle is a cheap clone around `Arc<Mutex<_>>`. Every trait operation
//! acquires the mutex once and performs all of its validation and mutation
//! inside that single critical section, so checks can never be invalidated
//! by a concurrent writer between read and commit. Key allocation in
//! particular is a read-increment-write unit under the lock: concurrent
//! creations in one project serialize and can never mint the same number.

mod graph;
mod inner;
mod jsonl;
mod trait_impl;

use crate::error::Result;
use crate::storage::snapshot::LoadWarning;
use inner::InMemoryStoreInner;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Thread-safe in-memory store.
///
/// Cloning produces another handle to the same underlying state; clones are
/// how concurrent tasks share one store.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<InMemoryStoreInner>>,
}

impl InMemoryStore {
    /// Create an empty, ephemeral store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(InMemoryStoreInner::new(None))),
        }
    }

    /// Open a store backed by a JSONL snapshot file.
    ///
    /// An existing file is loaded resiliently; problems with individual
    /// records come back as [`LoadWarning`]s alongside a usable store. A
    /// missing file yields an empty store that will create the file on the
    /// first `save()`.
    pub async fn open_jsonl(path: &Path) -> Result<(Self, Vec<LoadWarning>)> {
        let (inner, warnings) = if path.exists() {
            let (records, mut warnings) = jsonl::load_records(path).await?;
            let (inner, build_warnings) =
                jsonl::build_inner(records, Some(path.to_path_buf()));
            warnings.extend(build_warnings);
            (inner, warnings)
        } else {
            (InMemoryStoreInner::new(Some(path.to_path_buf())), Vec::new())
        };

        Ok((
            Self {
                inner: Arc::new(Mutex::new(inner)),
            },
            warnings,
        ))
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, InMemoryStoreInner> {
        self.inner.lock().await
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}
