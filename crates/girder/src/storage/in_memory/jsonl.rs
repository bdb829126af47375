//! Snapshot export, resilient import, and JSONL file plumbing.
//!
//! Export walks the inner state in a deterministic order so saved files diff
//! cleanly. Import rebuilds a fresh inner from records in dependency order
//! (projects, counters, releases, milestones, items, then relation edges),
//! skipping (or repairing) anything inconsistent and reporting it as a
//! [`LoadWarning`]. The store that comes back always satisfies the engine's
//! invariants, whatever the file contained.

use super::graph::{dependency_cycle_exists, RelationEdge};
use super::inner::InMemoryStoreInner;
use crate::domain::{validate_containment, DependencyEdge, Membership, ProjectId};
use crate::error::Result;
use crate::storage::snapshot::{LoadWarning, SnapshotRecord};
use girder_jsonl::{read_jsonl_resilient, write_jsonl_atomic};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Read snapshot records from a file, turning malformed lines into warnings.
pub(super) async fn load_records(
    path: &Path,
) -> Result<(Vec<SnapshotRecord>, Vec<LoadWarning>)> {
    let (records, line_warnings) = read_jsonl_resilient::<SnapshotRecord, _>(path).await?;
    let warnings = line_warnings
        .into_iter()
        .map(|w| LoadWarning::MalformedLine {
            line_number: w.line_number,
            reason: w.reason,
        })
        .collect();
    Ok((records, warnings))
}

/// Atomically write snapshot records to a file.
pub(super) async fn save_records(path: &Path, records: &[SnapshotRecord]) -> Result<()> {
    write_jsonl_atomic(path, records).await?;
    Ok(())
}

/// Serialize the inner state as records, deterministically ordered.
pub(super) fn export_records(inner: &InMemoryStoreInner) -> Vec<SnapshotRecord> {
    let mut records = Vec::new();

    let project_key = |id: &ProjectId| -> String {
        inner
            .projects
            .get(id)
            .map(|p| p.key.as_str().to_string())
            .unwrap_or_default()
    };

    let mut projects: Vec<_> = inner.projects.values().cloned().collect();
    projects.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
    records.extend(projects.into_iter().map(SnapshotRecord::Project));

    let mut counters: Vec<_> = inner
        .counters
        .iter()
        .map(|(project_id, next)| (project_id.clone(), *next))
        .collect();
    counters.sort_by_key(|(id, _)| project_key(id));
    records.extend(
        counters
            .into_iter()
            .map(|(project_id, next)| SnapshotRecord::Counter { project_id, next }),
    );

    let mut releases: Vec<_> = inner.releases.values().cloned().collect();
    releases.sort_by(|a, b| (project_key(&a.project_id), &a.name).cmp(&(project_key(&b.project_id), &b.name)));
    records.extend(releases.into_iter().map(SnapshotRecord::Release));

    let mut milestones: Vec<_> = inner.milestones.values().cloned().collect();
    milestones.sort_by(|a, b| (project_key(&a.project_id), &a.name).cmp(&(project_key(&b.project_id), &b.name)));
    records.extend(milestones.into_iter().map(SnapshotRecord::Milestone));

    let mut items: Vec<_> = inner.items.values().cloned().collect();
    items.sort_by(|a, b| a.key_id.cmp(&b.key_id));
    records.extend(items.into_iter().map(SnapshotRecord::Item));

    let mut memberships = Vec::new();
    let mut dependencies = Vec::new();
    for edge in inner.graph.edge_references() {
        let source = inner.graph[edge.source()].clone();
        let target = inner.graph[edge.target()].clone();
        match *edge.weight() {
            RelationEdge::Member(relation) => memberships.push(Membership {
                container_id: source,
                member_id: target,
                relation,
            }),
            RelationEdge::Dependency => dependencies.push(DependencyEdge {
                predecessor_id: source,
                successor_id: target,
            }),
        }
    }
    memberships.sort_by(|a, b| {
        (&a.container_id.0, &a.member_id.0, a.relation.to_string())
            .cmp(&(&b.container_id.0, &b.member_id.0, b.relation.to_string()))
    });
    dependencies.sort_by(|a, b| {
        (&a.predecessor_id.0, &a.successor_id.0).cmp(&(&b.predecessor_id.0, &b.successor_id.0))
    });
    records.extend(memberships.into_iter().map(SnapshotRecord::Membership));
    records.extend(dependencies.into_iter().map(SnapshotRecord::Dependency));

    records
}

/// Rebuild an inner store from snapshot records.
///
/// Never fails: inconsistent records are dropped (or counters repaired) with
/// a warning each, and whatever remains is loaded.
pub(super) fn build_inner(
    records: Vec<SnapshotRecord>,
    snapshot_path: Option<PathBuf>,
) -> (InMemoryStoreInner, Vec<LoadWarning>) {
    let mut inner = InMemoryStoreInner::new(snapshot_path);
    let mut warnings = Vec::new();

    // Bucket by record type so file ordering doesn't matter.
    let mut projects = Vec::new();
    let mut counters = Vec::new();
    let mut releases = Vec::new();
    let mut milestones = Vec::new();
    let mut items = Vec::new();
    let mut memberships = Vec::new();
    let mut dependencies = Vec::new();
    for record in records {
        match record {
            SnapshotRecord::Project(p) => projects.push(p),
            SnapshotRecord::Counter { project_id, next } => counters.push((project_id, next)),
            SnapshotRecord::Release(r) => releases.push(r),
            SnapshotRecord::Milestone(m) => milestones.push(m),
            SnapshotRecord::Item(i) => items.push(i),
            SnapshotRecord::Membership(m) => memberships.push(m),
            SnapshotRecord::Dependency(d) => dependencies.push(d),
        }
    }

    for project in projects {
        if inner.project_keys.contains_key(project.key.as_str()) {
            warnings.push(LoadWarning::DuplicateKey {
                key: project.key.as_str().to_string(),
            });
            continue;
        }
        inner.minter.register(project.id.as_str());
        inner
            .project_keys
            .insert(project.key.as_str().to_string(), project.id.clone());
        inner.projects.insert(project.id.clone(), project);
    }

    for (project_id, next) in counters {
        if !inner.projects.contains_key(&project_id) {
            warnings.push(LoadWarning::UnknownProject {
                entity: "counter".to_string(),
                project_id,
            });
            continue;
        }
        inner.counters.insert(project_id, next.max(1));
    }

    for release in releases {
        if !inner.projects.contains_key(&release.project_id) {
            warnings.push(LoadWarning::UnknownProject {
                entity: format!("release {}", release.name),
                project_id: release.project_id,
            });
            continue;
        }
        inner.minter.register(release.id.as_str());
        inner.releases.insert(release.id.clone(), release);
    }

    for milestone in milestones {
        if !inner.projects.contains_key(&milestone.project_id) {
            warnings.push(LoadWarning::UnknownProject {
                entity: format!("milestone {}", milestone.name),
                project_id: milestone.project_id,
            });
            continue;
        }
        inner.minter.register(milestone.id.as_str());
        inner.milestones.insert(milestone.id.clone(), milestone);
    }

    // Track the highest key number seen per project so lagging counters can
    // be repaired afterwards.
    let mut max_seen: HashMap<ProjectId, u64> = HashMap::new();

    for item in items {
        if !inner.projects.contains_key(&item.project_id) {
            warnings.push(LoadWarning::UnknownProject {
                entity: format!("work item {}", item.key_id),
                project_id: item.project_id,
            });
            continue;
        }
        if let Err(e) = item.validate() {
            warnings.push(LoadWarning::InvalidItem {
                key: item.key_id.clone(),
                reason: e.to_string(),
            });
            continue;
        }
        if inner.item_keys.contains_key(&item.key_id) {
            warnings.push(LoadWarning::DuplicateKey {
                key: item.key_id.clone(),
            });
            continue;
        }

        if let Some((_, number)) = item.key_id.rsplit_once('-')
            && let Ok(number) = number.parse::<u64>()
        {
            let entry = max_seen.entry(item.project_id.clone()).or_insert(0);
            *entry = (*entry).max(number);
        }

        inner.minter.register(item.id.as_str());
        inner.insert_item(item);
    }

    for (project_id, highest) in max_seen {
        let counter = inner.counters.entry(project_id.clone()).or_insert(1);
        if *counter <= highest {
            warnings.push(LoadWarning::CounterRepaired {
                project_id,
                found: *counter,
                repaired_to: highest + 1,
            });
            *counter = highest + 1;
        }
    }

    for membership in memberships {
        let Some(container) = inner.items.get(&membership.container_id) else {
            warnings.push(LoadWarning::UnknownItem {
                item_id: membership.container_id,
            });
            continue;
        };
        let Some(member) = inner.items.get(&membership.member_id) else {
            warnings.push(LoadWarning::UnknownItem {
                item_id: membership.member_id,
            });
            continue;
        };
        if membership.container_id == membership.member_id {
            warnings.push(LoadWarning::InvalidRelation {
                reason: format!("self-membership on {}", container.key_id),
            });
            continue;
        }
        if let Err(e) = validate_containment(container.kind, member.kind) {
            warnings.push(LoadWarning::InvalidRelation {
                reason: e.to_string(),
            });
            continue;
        }

        let container_node = inner.node_map[&membership.container_id];
        let member_node = inner.node_map[&membership.member_id];
        let duplicate = inner.graph.edges(container_node).any(|edge| {
            edge.target() == member_node
                && *edge.weight() == RelationEdge::Member(membership.relation)
        });
        if duplicate {
            warnings.push(LoadWarning::InvalidRelation {
                reason: format!(
                    "duplicate membership {} -> {}",
                    container.key_id,
                    inner.items[&membership.member_id].key_id
                ),
            });
            continue;
        }

        inner.graph.add_edge(
            container_node,
            member_node,
            RelationEdge::Member(membership.relation),
        );
    }

    for dependency in dependencies {
        if !inner.items.contains_key(&dependency.predecessor_id) {
            warnings.push(LoadWarning::UnknownItem {
                item_id: dependency.predecessor_id,
            });
            continue;
        }
        if !inner.items.contains_key(&dependency.successor_id) {
            warnings.push(LoadWarning::UnknownItem {
                item_id: dependency.successor_id,
            });
            continue;
        }
        if dependency.predecessor_id == dependency.successor_id {
            warnings.push(LoadWarning::InvalidRelation {
                reason: format!(
                    "self-dependency on {}",
                    inner.items[&dependency.predecessor_id].key_id
                ),
            });
            continue;
        }

        let predecessor_node = inner.node_map[&dependency.predecessor_id];
        let successor_node = inner.node_map[&dependency.successor_id];
        let duplicate = inner.graph.edges(predecessor_node).any(|edge| {
            edge.target() == successor_node && *edge.weight() == RelationEdge::Dependency
        });
        if duplicate {
            warnings.push(LoadWarning::InvalidRelation {
                reason: format!(
                    "duplicate dependency {} -> {}",
                    inner.items[&dependency.predecessor_id].key_id,
                    inner.items[&dependency.successor_id].key_id
                ),
            });
            continue;
        }

        // An edge that would close a loop is dropped rather than loaded; the
        // rest of the graph stays usable.
        if dependency_cycle_exists(
            &inner.graph,
            &inner.node_map,
            &dependency.predecessor_id,
            &dependency.successor_id,
        ) {
            warnings.push(LoadWarning::CycleEdgeSkipped {
                predecessor_id: dependency.predecessor_id,
                successor_id: dependency.successor_id,
            });
            continue;
        }

        inner
            .graph
            .add_edge(predecessor_node, successor_node, RelationEdge::Dependency);
    }

    (inner, warnings)
}
