//! Core in-memory data structures and lock-free helpers.
//!
//! `InMemoryStoreInner` owns all state and is wrapped in `Arc<Mutex<>>` by
//! the public handle. Helpers here assume the caller already holds the lock.

use super::graph::RelationEdge;
use crate::domain::{
    rollup_progress, rollup_status, MilestoneId, Project, ProjectId, ProjectMilestone, Release,
    ReleaseId, WorkItem, WorkItemId, WorkItemKind,
};
use crate::error::{Error, Result};
use crate::ident::IdMinter;
use chrono::Utc;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::path::PathBuf;

/// Inner storage structure (not thread-safe on its own).
pub(crate) struct InMemoryStoreInner {
    /// Projects indexed by id.
    pub(super) projects: HashMap<ProjectId, Project>,

    /// Project key -> project id, enforcing key uniqueness.
    pub(super) project_keys: HashMap<String, ProjectId>,

    /// Per-project key counters: the next number to allocate, created
    /// lazily at 1 on first use. Entries only ever grow.
    pub(super) counters: HashMap<ProjectId, u64>,

    /// Work items indexed by opaque id.
    pub(super) items: HashMap<WorkItemId, WorkItem>,

    /// Work item key (`PROJ-7`) -> opaque id, enforcing key uniqueness.
    pub(super) item_keys: HashMap<String, WorkItemId>,

    /// The relation graph: dependency and membership edges over work items.
    ///
    /// Stable indices: removing a node leaves every other `NodeIndex` in
    /// `node_map` valid.
    pub(super) graph: StableDiGraph<WorkItemId, RelationEdge>,

    /// Work item id -> graph node. Every stored item has a node.
    pub(super) node_map: HashMap<WorkItemId, NodeIndex>,

    /// Releases indexed by id.
    pub(super) releases: HashMap<ReleaseId, Release>,

    /// Milestones indexed by id.
    pub(super) milestones: HashMap<MilestoneId, ProjectMilestone>,

    /// Opaque id minter, seeded with every id seen so far.
    pub(super) minter: IdMinter,

    /// Snapshot file for `save()`/`reload()`; `None` for ephemeral stores.
    pub(super) snapshot_path: Option<PathBuf>,
}

impl InMemoryStoreInner {
    /// Create an empty store, optionally bound to a snapshot file.
    pub(super) fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            projects: HashMap::new(),
            project_keys: HashMap::new(),
            counters: HashMap::new(),
            items: HashMap::new(),
            item_keys: HashMap::new(),
            graph: StableDiGraph::new(),
            node_map: HashMap::new(),
            releases: HashMap::new(),
            milestones: HashMap::new(),
            minter: IdMinter::new(),
            snapshot_path,
        }
    }

    /// Allocate the next key for a project: read, format, increment, as one
    /// unit under the caller-held lock.
    pub(super) fn allocate_key(&mut self, project_id: &ProjectId) -> Result<String> {
        let project = self
            .projects
            .get(project_id)
            .ok_or_else(|| Error::ProjectNotFound(project_id.clone()))?;

        let counter = self.counters.entry(project_id.clone()).or_insert(1);
        let n = *counter;
        *counter += 1;

        Ok(project.key.item_key(n))
    }

    /// Mint an opaque id, mapping exhaustion to a storage error.
    pub(super) fn mint_id(&mut self, seed: &str) -> Result<String> {
        self.minter
            .mint(seed)
            .map_err(|e| Error::Storage(e.to_string()))
    }

    /// Look up a work item or fail with `ItemNotFound`.
    pub(super) fn require_item(&self, id: &WorkItemId) -> Result<&WorkItem> {
        self.items
            .get(id)
            .ok_or_else(|| Error::ItemNotFound(id.clone()))
    }

    /// Insert a work item and its graph node.
    pub(super) fn insert_item(&mut self, item: WorkItem) {
        let node = self.graph.add_node(item.id.clone());
        self.node_map.insert(item.id.clone(), node);
        self.item_keys.insert(item.key_id.clone(), item.id.clone());
        self.items.insert(item.id.clone(), item);
    }

    /// Members held by `container`, optionally restricted to one relation.
    ///
    /// Returns clones in edge-insertion order; empty for unknown ids.
    pub(super) fn members_of(
        &self,
        container: &WorkItemId,
        relation: Option<WorkItemKind>,
    ) -> Vec<WorkItem> {
        let Some(&node) = self.node_map.get(container) else {
            return Vec::new();
        };
        self.graph
            .edges(node)
            .filter(|edge| edge.weight().is_membership(relation))
            .filter_map(|edge| self.items.get(&self.graph[edge.target()]))
            .cloned()
            .collect()
    }

    /// Containers holding `member`, optionally restricted to one relation.
    pub(super) fn containers_of(
        &self,
        member: &WorkItemId,
        relation: Option<WorkItemKind>,
    ) -> Vec<WorkItem> {
        let Some(&node) = self.node_map.get(member) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(node, Direction::Incoming)
            .filter(|edge| edge.weight().is_membership(relation))
            .filter_map(|edge| self.items.get(&self.graph[edge.source()]))
            .cloned()
            .collect()
    }

    /// Items that must finish before `id` (dependency edges pointing at it).
    pub(super) fn predecessors_of(&self, id: &WorkItemId) -> Vec<WorkItem> {
        let Some(&node) = self.node_map.get(id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(node, Direction::Incoming)
            .filter(|edge| *edge.weight() == RelationEdge::Dependency)
            .filter_map(|edge| self.items.get(&self.graph[edge.source()]))
            .cloned()
            .collect()
    }

    /// Items waiting on `id` (dependency edges leaving it).
    pub(super) fn successors_of(&self, id: &WorkItemId) -> Vec<WorkItem> {
        let Some(&node) = self.node_map.get(id) else {
            return Vec::new();
        };
        self.graph
            .edges(node)
            .filter(|edge| *edge.weight() == RelationEdge::Dependency)
            .filter_map(|edge| self.items.get(&self.graph[edge.target()]))
            .cloned()
            .collect()
    }

    /// Predecessors of `id` whose status is anything but done.
    pub(super) fn unfinished_predecessors(&self, id: &WorkItemId) -> Vec<WorkItem> {
        self.predecessors_of(id)
            .into_iter()
            .filter(|p| !p.is_completed())
            .collect()
    }

    /// Recompute rollup status/progress for an item from its direct members.
    ///
    /// No-op when the item is missing, not in rollup mode, or has no members
    /// (an empty container keeps its manually-set values). The completion
    /// timestamp is re-applied after a status change.
    pub(super) fn refresh_rollup(&mut self, id: &WorkItemId) {
        let Some(item) = self.items.get(id) else {
            return;
        };
        if !item.rollup_mode {
            return;
        }

        let members = self.members_of(id, None);
        let status = rollup_status(&members);
        let progress = rollup_progress(&members);
        if status.is_none() && progress.is_none() {
            return;
        }

        let Some(item) = self.items.get_mut(id) else {
            return;
        };
        let mut changed = false;
        if let Some(status) = status
            && item.status != status
        {
            item.status = status;
            changed = true;
        }
        if let Some(progress) = progress
            && (item.progress_pct - progress).abs() > f64::EPSILON
        {
            item.progress_pct = progress;
            changed = true;
        }
        item.apply_completion_timestamp();
        if changed {
            item.updated_at = Utc::now();
        }
    }
}
