//! Storage abstraction layer for girder.
//!
//! The engine's persistence boundary is the [`WorkItemStore`] trait: an
//! object-safe async trait covering projects, work items, relations, derived
//! state, attachments, and snapshots. One backend ships today (an in-memory
//! store with optional JSONL snapshot persistence) and the trait leaves room
//! for a database backend without changing callers.
//!
//! # Atomicity
//!
//! Every operation validates and mutates inside a single lock acquisition on
//! the backing state. A cycle check and the edge insert it guards can never
//! interleave with a concurrent conflicting write, and key allocation is a
//! read-increment-write unit: the application-level equivalent of running
//! each call in one serializable transaction.
//!
//! # Example
//!
//! ```no_run
//! use girder::domain::{NewProject, NewWorkItem, WorkItemKind};
//! use girder::storage::{create_store, StoreBackend};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let mut store = create_store(StoreBackend::Memory).await?;
//!
//!     let project = store
//!         .create_project(NewProject {
//!             key: Some("DEMO".into()),
//!             name: "Demo".into(),
//!             description: String::new(),
//!         })
//!         .await?;
//!
//!     let item = store
//!         .create(NewWorkItem::new(project.id.clone(), WorkItemKind::Task, "First task"))
//!         .await?;
//!     println!("created {}", item.key_id);
//!
//!     Ok(())
//! }
//! ```

use crate::domain::{
    MilestoneId, NewMilestone, NewProject, NewRelease, NewWorkItem, Project, ProjectId,
    ProjectMilestone, Release, ReleaseId, WorkItem, WorkItemFilter, WorkItemId, WorkItemKind,
    WorkItemUpdate,
};
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

pub mod in_memory;
pub mod snapshot;

pub use snapshot::{LoadWarning, SnapshotRecord};

/// Core storage trait for the work-item graph engine.
///
/// Implementations must be `Send + Sync`; the trait is object-safe and is
/// normally consumed as `Box<dyn WorkItemStore>`.
///
/// # Method categories
///
/// - **Projects & keys**: `create_project`, `get_project`,
///   `get_project_by_key`, `list_projects`, `next_key`
/// - **Work item CRUD**: `create`, `get`, `get_by_key`, `update`, `delete`,
///   `list`
/// - **Containment**: `add_membership`, `remove_membership`, `get_members`,
///   `get_containers`
/// - **Dependencies**: `add_dependency`, `remove_dependency`,
///   `get_predecessors`, `get_successors`
/// - **Derived state**: `recompute_rollup`, `is_blocked`, `blocked_items`
/// - **Attachments**: labels, releases, milestones
/// - **Persistence**: `export_snapshot`, `import_snapshot`, `save`, `reload`
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    // ========== Projects & keys ==========

    /// Create a project.
    ///
    /// When no key is supplied one is derived from the name. An explicit key
    /// is validated and must be unused.
    ///
    /// # Errors
    ///
    /// - `ValidationError::InvalidProjectKey` for a malformed explicit key
    /// - `ConflictError::DuplicateProjectKey` if the key is taken
    async fn create_project(&mut self, project: NewProject) -> Result<Project>;

    /// Get a project by id. Returns `None` if it doesn't exist.
    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>>;

    /// Get a project by key. Returns `None` if it doesn't exist.
    async fn get_project_by_key(&self, key: &str) -> Result<Option<Project>>;

    /// List all projects, ordered by key.
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Allocate the next work-item key for a project.
    ///
    /// Reads the project's counter (creating it at 1 on first use), formats
    /// `"{KEY}-{n}"`, and increments the counter, all as one atomic unit.
    /// Allocated numbers are never reused, even if the item they were minted
    /// for is deleted.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProjectNotFound` if the project does not exist.
    async fn next_key(&mut self, project_id: &ProjectId) -> Result<String>;

    // ========== Work item CRUD ==========

    /// Create a work item.
    ///
    /// Validates fields and the parent relation, allocates a key, generates
    /// an opaque id, and stores the item. Kind, key, and project are
    /// immutable afterwards.
    ///
    /// # Errors
    ///
    /// - `Error::ProjectNotFound` if the project doesn't exist
    /// - `Error::ItemNotFound` if a referenced parent doesn't exist
    /// - `Error::Validation` for field or hierarchy violations
    async fn create(&mut self, item: NewWorkItem) -> Result<WorkItem>;

    /// Get a work item by id. Returns `None` if it doesn't exist.
    async fn get(&self, id: &WorkItemId) -> Result<Option<WorkItem>>;

    /// Get a work item by its human-readable key (`PROJ-7`).
    async fn get_by_key(&self, key_id: &str) -> Result<Option<WorkItem>>;

    /// Update a work item.
    ///
    /// Only fields present in `updates` change. Validation runs against the
    /// fully-updated item before anything is committed; on failure the store
    /// is untouched. Status changes trigger the completion-date side effect,
    /// and items in rollup mode are recomputed from their members.
    ///
    /// # Errors
    ///
    /// - `Error::ItemNotFound` if the item doesn't exist
    /// - `Error::Validation` for field or hierarchy violations
    async fn update(&mut self, id: &WorkItemId, updates: WorkItemUpdate) -> Result<WorkItem>;

    /// Delete a work item.
    ///
    /// Cascades to the item's memberships (both roles), dependency edges
    /// (both directions), and attachments. Children of the deleted item are
    /// NOT re-parented; callers detach them explicitly first if they care.
    ///
    /// # Errors
    ///
    /// Returns `Error::ItemNotFound` if the item doesn't exist.
    async fn delete(&mut self, id: &WorkItemId) -> Result<()>;

    /// List work items matching the filter, newest first.
    async fn list(&self, filter: &WorkItemFilter) -> Result<Vec<WorkItem>>;

    // ========== Containment ==========

    /// Add a membership: `container` holds `member` as `relation`.
    ///
    /// Checks existence, self-membership, same-project, the kind containment
    /// table, and triple uniqueness, then inserts the edge and recomputes
    /// the container's rollup.
    ///
    /// # Errors
    ///
    /// - `Error::ItemNotFound` if either end doesn't exist
    /// - `Error::Validation` for self-membership, cross-project, or a kind
    ///   pairing outside the containment table
    /// - `Error::Conflict` if the exact triple already exists
    async fn add_membership(
        &mut self,
        container: &WorkItemId,
        member: &WorkItemId,
        relation: WorkItemKind,
    ) -> Result<()>;

    /// Remove every membership between `container` and `member`, regardless
    /// of relation, then recompute the container's rollup.
    ///
    /// # Errors
    ///
    /// - `Error::ItemNotFound` if either end doesn't exist
    /// - `Error::MembershipNotFound` if no membership exists for the pair
    async fn remove_membership(
        &mut self,
        container: &WorkItemId,
        member: &WorkItemId,
    ) -> Result<()>;

    /// The members held by `container`, optionally restricted to one
    /// relation.
    async fn get_members(
        &self,
        container: &WorkItemId,
        relation: Option<WorkItemKind>,
    ) -> Result<Vec<WorkItem>>;

    /// The containers holding `member`, optionally restricted to one
    /// relation.
    async fn get_containers(
        &self,
        member: &WorkItemId,
        relation: Option<WorkItemKind>,
    ) -> Result<Vec<WorkItem>>;

    // ========== Dependencies ==========

    /// Add a dependency edge: `predecessor` must finish before `successor`.
    ///
    /// Checks existence, self-dependency, same-project, edge uniqueness, and
    /// acyclicity before inserting.
    ///
    /// # Errors
    ///
    /// - `Error::ItemNotFound` if either end doesn't exist
    /// - `Error::Validation` for self-dependency, cross-project, or a
    ///   cycle-closing edge
    /// - `Error::Conflict` if the edge already exists
    async fn add_dependency(
        &mut self,
        predecessor: &WorkItemId,
        successor: &WorkItemId,
    ) -> Result<()>;

    /// Remove a dependency edge.
    ///
    /// # Errors
    ///
    /// - `Error::ItemNotFound` if either end doesn't exist
    /// - `Error::DependencyNotFound` if the edge doesn't exist
    async fn remove_dependency(
        &mut self,
        predecessor: &WorkItemId,
        successor: &WorkItemId,
    ) -> Result<()>;

    /// The items that must finish before `id`.
    async fn get_predecessors(&self, id: &WorkItemId) -> Result<Vec<WorkItem>>;

    /// The items waiting on `id`.
    async fn get_successors(&self, id: &WorkItemId) -> Result<Vec<WorkItem>>;

    // ========== Derived state ==========

    /// Recompute a container's rollup status and progress from its members.
    ///
    /// No-op (returning the item unchanged) unless the item has
    /// `rollup_mode` set or has no members. Recomputation does not propagate
    /// to the container's own containers; callers recompute ancestors
    /// explicitly when they need them fresh.
    ///
    /// # Errors
    ///
    /// Returns `Error::ItemNotFound` if the item doesn't exist.
    async fn recompute_rollup(&mut self, id: &WorkItemId) -> Result<WorkItem>;

    /// Whether the item is blocked: its own status is blocked, or any
    /// predecessor is not done. Derived on read, never stored.
    ///
    /// # Errors
    ///
    /// Returns `Error::ItemNotFound` if the item doesn't exist.
    async fn is_blocked(&self, id: &WorkItemId) -> Result<bool>;

    /// Every blocked item, paired with the unfinished predecessors blocking
    /// it (empty when the item is blocked only by its own status).
    async fn blocked_items(&self) -> Result<Vec<(WorkItem, Vec<WorkItem>)>>;

    // ========== Attachments ==========

    /// Add a label to an item. Idempotent.
    async fn add_label(&mut self, id: &WorkItemId, label: &str) -> Result<WorkItem>;

    /// Remove a label from an item. Idempotent.
    async fn remove_label(&mut self, id: &WorkItemId, label: &str) -> Result<WorkItem>;

    /// Create a release under a project.
    async fn create_release(&mut self, release: NewRelease) -> Result<Release>;

    /// Attach a release to a work item. Idempotent; both must share a
    /// project.
    async fn assign_release(&mut self, id: &WorkItemId, release: &ReleaseId) -> Result<WorkItem>;

    /// Detach a release from a work item. Idempotent.
    async fn unassign_release(&mut self, id: &WorkItemId, release: &ReleaseId)
        -> Result<WorkItem>;

    /// Create a milestone under a project.
    async fn create_milestone(&mut self, milestone: NewMilestone) -> Result<ProjectMilestone>;

    /// Attach a milestone to a work item. Idempotent; both must share a
    /// project.
    async fn assign_milestone(
        &mut self,
        id: &WorkItemId,
        milestone: &MilestoneId,
    ) -> Result<WorkItem>;

    /// Detach a milestone from a work item. Idempotent.
    async fn unassign_milestone(
        &mut self,
        id: &WorkItemId,
        milestone: &MilestoneId,
    ) -> Result<WorkItem>;

    // ========== Persistence ==========

    /// Export the full store state as snapshot records, in a deterministic
    /// order.
    async fn export_snapshot(&self) -> Result<Vec<SnapshotRecord>>;

    /// Replace the store state with the given records.
    ///
    /// Loading is resilient: records that reference missing entities, close
    /// cycles, or fail validation are skipped (or repaired, for counters)
    /// and reported as [`LoadWarning`]s.
    async fn import_snapshot(&mut self, records: Vec<SnapshotRecord>) -> Result<Vec<LoadWarning>>;

    /// Persist the store to its backing file, if it has one. No-op for
    /// purely in-memory stores.
    async fn save(&self) -> Result<()>;

    /// Discard in-memory state and reload from the backing file, if any.
    async fn reload(&mut self) -> Result<()>;
}

/// Storage backend configuration.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// In-memory storage (ephemeral).
    Memory,

    /// In-memory storage persisted to a JSONL snapshot file.
    Jsonl(PathBuf),
}

/// Create a store for the given backend.
///
/// For the JSONL backend, an existing snapshot file is loaded resiliently
/// (warnings are logged via `tracing`) and `save()` rewrites it atomically.
///
/// # Errors
///
/// Returns `Error::Io`/`Error::Snapshot` if an existing snapshot file cannot
/// be read.
pub async fn create_store(backend: StoreBackend) -> Result<Box<dyn WorkItemStore>> {
    match backend {
        StoreBackend::Memory => Ok(Box::new(in_memory::InMemoryStore::new())),
        StoreBackend::Jsonl(path) => {
            let (store, warnings) = in_memory::InMemoryStore::open_jsonl(&path).await?;
            for warning in &warnings {
                tracing::warn!(%warning, "snapshot load warning");
            }
            Ok(Box::new(store))
        }
    }
}
