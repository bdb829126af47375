//! Relation-graph algorithms: hierarchy and dependency cycle rejection.
//!
//! One `StableDiGraph` carries both relation families, discriminated by
//! [`RelationEdge`]:
//!
//! - `Dependency`: edge points predecessor -> successor. Outgoing dependency
//!   edges of a node lead to its successors.
//! - `Member(relation)`: edge points container -> member, weighted with the
//!   relation under which the member is held.
//!
//! Both traversals here are iterative with explicit visited sets, so they
//! terminate even on state that is already malformed (a parent chain that
//! loops, a snapshot edited by hand).

use crate::domain::{ProjectId, WorkItem, WorkItemId, WorkItemKind};
use crate::error::{Error, Result, ValidationError};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// Weight of an edge in the relation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RelationEdge {
    /// Predecessor -> successor dependency.
    Dependency,

    /// Container -> member containment, held under the given relation.
    Member(WorkItemKind),
}

impl RelationEdge {
    /// Whether this is a membership edge, optionally of one specific
    /// relation.
    pub(super) fn is_membership(self, relation: Option<WorkItemKind>) -> bool {
        match self {
            Self::Member(r) => relation.is_none_or(|want| want == r),
            Self::Dependency => false,
        }
    }
}

/// Validate assigning `parent_id` as the parent of a work item.
///
/// `child` is `None` while the child is still being created (it cannot be on
/// any existing parent chain yet). Rules, in order: the parent must exist,
/// both ends must be tasks in the same project, self-parenting is rejected,
/// and the chain walked upward from the candidate parent must reach neither
/// the child nor any node twice.
pub(super) fn validate_parent(
    items: &HashMap<WorkItemId, WorkItem>,
    child: Option<&WorkItemId>,
    child_kind: WorkItemKind,
    child_project: &ProjectId,
    parent_id: &WorkItemId,
) -> Result<()> {
    let parent = items
        .get(parent_id)
        .ok_or_else(|| Error::ItemNotFound(parent_id.clone()))?;

    if child_kind != WorkItemKind::Task || parent.kind != WorkItemKind::Task {
        return Err(ValidationError::ParentNotTask {
            child: child_kind,
            parent: parent.kind,
        }
        .into());
    }

    if child == Some(parent_id) {
        return Err(ValidationError::SelfParent.into());
    }

    if parent.project_id != *child_project {
        return Err(ValidationError::CrossProject {
            left: child.map_or_else(|| "new work item".to_string(), |id| id.to_string()),
            right: parent.key_id.clone(),
        }
        .into());
    }

    // Walk upward from the candidate parent. Reaching the child means the
    // assignment would close a loop; revisiting a node means the chain is
    // already looped and unsafe to extend.
    let mut visited: HashSet<&WorkItemId> = HashSet::new();
    let mut current = Some(parent_id);

    while let Some(current_id) = current {
        if child == Some(current_id) {
            return Err(ValidationError::ParentCycle.into());
        }
        if !visited.insert(current_id) {
            return Err(ValidationError::ParentCycle.into());
        }
        current = items.get(current_id).and_then(|item| item.parent_id.as_ref());
    }

    Ok(())
}

/// Whether adding the dependency edge `predecessor -> successor` would close
/// a cycle.
///
/// Depth-first from `successor`, following only outgoing dependency edges;
/// finding `predecessor` means a path successor ->* predecessor already
/// exists and the new edge would complete a loop.
pub(super) fn dependency_cycle_exists(
    graph: &StableDiGraph<WorkItemId, RelationEdge>,
    node_map: &HashMap<WorkItemId, NodeIndex>,
    predecessor: &WorkItemId,
    successor: &WorkItemId,
) -> bool {
    let (Some(&pred_node), Some(&succ_node)) = (node_map.get(predecessor), node_map.get(successor))
    else {
        return false;
    };

    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut stack = vec![succ_node];

    while let Some(node) = stack.pop() {
        if node == pred_node {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        for edge in graph.edges(node) {
            if *edge.weight() == RelationEdge::Dependency {
                stack.push(edge.target());
            }
        }
    }

    false
}
