//! Snapshot records: the JSONL serialization of the full store state.
//!
//! A snapshot file holds one tagged record per line, mirroring the logical
//! table layout: projects, one counter row per project, releases, milestones,
//! work items, and the composite-keyed membership and dependency tables.
//! Attachments (labels, releases, milestones) ride inline on their item.

use crate::domain::{
    DependencyEdge, Membership, Project, ProjectId, ProjectMilestone, Release, WorkItem,
    WorkItemId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One line of a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum SnapshotRecord {
    /// A project row.
    Project(Project),

    /// A project's key counter: the next number to allocate.
    Counter {
        /// The counted project.
        project_id: ProjectId,
        /// Next key number, >= 1.
        next: u64,
    },

    /// A release row.
    Release(Release),

    /// A milestone row.
    Milestone(ProjectMilestone),

    /// A work item row.
    Item(WorkItem),

    /// A membership row.
    Membership(Membership),

    /// A dependency row.
    Dependency(DependencyEdge),
}

/// A non-fatal problem found while loading a snapshot.
///
/// The offending record is skipped (or repaired, for counters) and loading
/// continues; the store that comes back is always internally consistent.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadWarning {
    /// A line could not be parsed as any record.
    MalformedLine {
        /// 1-based line number.
        line_number: usize,
        /// Parser message.
        reason: String,
    },

    /// A record referenced a project that is not in the snapshot.
    UnknownProject {
        /// What referenced it (a key or name).
        entity: String,
        /// The missing project.
        project_id: ProjectId,
    },

    /// A membership or dependency row referenced a missing work item.
    UnknownItem {
        /// The missing work item.
        item_id: WorkItemId,
    },

    /// Two item rows claimed the same key; the later one is dropped.
    DuplicateKey {
        /// The contested key.
        key: String,
    },

    /// An item row failed field validation and was dropped.
    InvalidItem {
        /// The item's key.
        key: String,
        /// Which rule failed.
        reason: String,
    },

    /// A relation row was invalid (self-reference, kind pairing, duplicate)
    /// and was dropped.
    InvalidRelation {
        /// Which rule failed.
        reason: String,
    },

    /// A dependency row would have closed a cycle and was dropped.
    CycleEdgeSkipped {
        /// The predecessor of the dropped edge.
        predecessor_id: WorkItemId,
        /// The successor of the dropped edge.
        successor_id: WorkItemId,
    },

    /// A counter lagged behind the item keys already issued and was bumped.
    CounterRepaired {
        /// The repaired project.
        project_id: ProjectId,
        /// Counter value found in the snapshot.
        found: u64,
        /// Value after repair.
        repaired_to: u64,
    },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLine {
                line_number,
                reason,
            } => write!(f, "line {line_number}: {reason}"),
            Self::UnknownProject { entity, project_id } => {
                write!(f, "{entity}: unknown project {project_id}")
            }
            Self::UnknownItem { item_id } => write!(f, "unknown work item {item_id}"),
            Self::DuplicateKey { key } => write!(f, "duplicate work item key {key}"),
            Self::InvalidItem { key, reason } => write!(f, "invalid work item {key}: {reason}"),
            Self::InvalidRelation { reason } => write!(f, "invalid relation: {reason}"),
            Self::CycleEdgeSkipped {
                predecessor_id,
                successor_id,
            } => write!(
                f,
                "dropped cycle-closing dependency {predecessor_id} -> {successor_id}"
            ),
            Self::CounterRepaired {
                project_id,
                found,
                repaired_to,
            } => write!(
                f,
                "counter for {project_id} behind issued keys ({found} -> {repaired_to})"
            ),
        }
    }
}
