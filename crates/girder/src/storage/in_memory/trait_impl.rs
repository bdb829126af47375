//! `WorkItemStore` trait implementation for the in-memory backend.
//!
//! Every method acquires the inner mutex exactly once; all validation and
//! mutation for an operation happens inside that single critical section, so
//! a failed validation leaves the store untouched and no check can be
//! invalidated by a concurrent writer.

use super::graph::{dependency_cycle_exists, validate_parent, RelationEdge};
use super::{jsonl, InMemoryStore};
use crate::domain::{
    MilestoneId, MilestoneStatus, NewMilestone, NewProject, NewRelease, NewWorkItem, Project,
    ProjectId, ProjectMilestone, Release, ReleaseId, ReleaseStatus, WorkItem, WorkItemFilter,
    WorkItemId, WorkItemKind, WorkItemUpdate,
};
use crate::error::{ConflictError, Error, Result, ValidationError};
use crate::keys::{derive_project_key, ProjectKey};
use crate::storage::snapshot::{LoadWarning, SnapshotRecord};
use crate::storage::WorkItemStore;
use async_trait::async_trait;
use chrono::Utc;
use petgraph::visit::EdgeRef;
use std::collections::HashSet;

#[async_trait]
impl WorkItemStore for InMemoryStore {
    // ========== Projects & keys ==========

    async fn create_project(&mut self, project: NewProject) -> Result<Project> {
        let mut inner = self.lock().await;

        let key = match project.key {
            Some(raw) => {
                let key = ProjectKey::parse(raw)?;
                if inner.project_keys.contains_key(key.as_str()) {
                    return Err(ConflictError::DuplicateProjectKey(key.as_str().to_string()).into());
                }
                key
            }
            None => derive_project_key(&project.name, |candidate| {
                inner.project_keys.contains_key(candidate)
            }),
        };

        let id = ProjectId::new(inner.mint_id(&format!("project:{key}"))?);
        let created = Project {
            id: id.clone(),
            key: key.clone(),
            name: project.name,
            description: project.description,
            created_at: Utc::now(),
        };

        inner.project_keys.insert(key.as_str().to_string(), id.clone());
        inner.projects.insert(id, created.clone());
        Ok(created)
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>> {
        let inner = self.lock().await;
        Ok(inner.projects.get(id).cloned())
    }

    async fn get_project_by_key(&self, key: &str) -> Result<Option<Project>> {
        let inner = self.lock().await;
        Ok(inner
            .project_keys
            .get(key)
            .and_then(|id| inner.projects.get(id))
            .cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let inner = self.lock().await;
        let mut projects: Vec<Project> = inner.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        Ok(projects)
    }

    async fn next_key(&mut self, project_id: &ProjectId) -> Result<String> {
        let mut inner = self.lock().await;
        inner.allocate_key(project_id)
    }

    // ========== Work item CRUD ==========

    async fn create(&mut self, new_item: NewWorkItem) -> Result<WorkItem> {
        let mut inner = self.lock().await;

        // Phase 1: validations, no mutation.
        new_item.validate()?;
        if !inner.projects.contains_key(&new_item.project_id) {
            return Err(Error::ProjectNotFound(new_item.project_id.clone()));
        }
        if let Some(parent_id) = &new_item.parent_id {
            validate_parent(
                &inner.items,
                None,
                new_item.kind,
                &new_item.project_id,
                parent_id,
            )?;
        }

        // Phase 2: identity. The key counter moves even if a later step
        // fails; allocated numbers are never handed out twice.
        let key_id = inner.allocate_key(&new_item.project_id)?;
        if inner.item_keys.contains_key(&key_id) {
            return Err(ConflictError::DuplicateItemKey(key_id).into());
        }
        let id = WorkItemId::new(inner.mint_id(&format!("item:{key_id}:{}", new_item.title))?);

        let now = Utc::now();
        let mut item = WorkItem {
            id,
            key_id,
            project_id: new_item.project_id,
            kind: new_item.kind,
            title: new_item.title,
            description: new_item.description,
            status: new_item.status,
            priority: new_item.priority,
            parent_id: new_item.parent_id,
            story_kind: new_item.story_kind,
            assignee: new_item.assignee,
            reporter: new_item.reporter,
            created_at: now,
            updated_at: now,
            started_at: None,
            due_at: new_item.due_at,
            completed_at: None,
            progress_pct: new_item.progress_pct,
            rollup_mode: new_item.rollup_mode,
            repo_url: new_item.repo_url,
            branch: new_item.branch,
            commit_hash: new_item.commit_hash,
            labels: Vec::new(),
            releases: Vec::new(),
            milestones: Vec::new(),
        };
        item.apply_completion_timestamp();

        inner.insert_item(item.clone());
        Ok(item)
    }

    async fn get(&self, id: &WorkItemId) -> Result<Option<WorkItem>> {
        let inner = self.lock().await;
        Ok(inner.items.get(id).cloned())
    }

    async fn get_by_key(&self, key_id: &str) -> Result<Option<WorkItem>> {
        let inner = self.lock().await;
        Ok(inner
            .item_keys
            .get(key_id)
            .and_then(|id| inner.items.get(id))
            .cloned())
    }

    async fn update(&mut self, id: &WorkItemId, updates: WorkItemUpdate) -> Result<WorkItem> {
        let mut inner = self.lock().await;

        // Work on a copy; nothing is committed until every check passes.
        let mut updated = inner.require_item(id)?.clone();

        if let Some(title) = updates.title {
            updated.title = title;
        }
        if let Some(description) = updates.description {
            updated.description = description;
        }
        if let Some(status) = updates.status {
            updated.status = status;
        }
        if let Some(priority) = updates.priority {
            updated.priority = priority;
        }
        if let Some(parent_id) = updates.parent_id {
            updated.parent_id = parent_id;
        }
        if let Some(story_kind) = updates.story_kind {
            updated.story_kind = story_kind;
        }
        if let Some(assignee) = updates.assignee {
            updated.assignee = assignee;
        }
        if let Some(reporter) = updates.reporter {
            updated.reporter = reporter;
        }
        if let Some(started_at) = updates.started_at {
            updated.started_at = started_at;
        }
        if let Some(due_at) = updates.due_at {
            updated.due_at = due_at;
        }
        if let Some(progress_pct) = updates.progress_pct {
            updated.progress_pct = progress_pct;
        }
        if let Some(rollup_mode) = updates.rollup_mode {
            updated.rollup_mode = rollup_mode;
        }
        if let Some(repo_url) = updates.repo_url {
            updated.repo_url = repo_url;
        }
        if let Some(branch) = updates.branch {
            updated.branch = branch;
        }
        if let Some(commit_hash) = updates.commit_hash {
            updated.commit_hash = commit_hash;
        }

        updated.validate()?;
        if let Some(parent_id) = updated.parent_id.clone() {
            validate_parent(
                &inner.items,
                Some(id),
                updated.kind,
                &updated.project_id,
                &parent_id,
            )?;
        }

        // Derived fields: rollup overrides manual status/progress when the
        // container has members, then the completion timestamp follows the
        // final status.
        if updated.rollup_mode {
            let members = inner.members_of(id, None);
            if let Some(status) = crate::domain::rollup_status(&members) {
                updated.status = status;
            }
            if let Some(progress) = crate::domain::rollup_progress(&members) {
                updated.progress_pct = progress;
            }
        }
        updated.apply_completion_timestamp();
        updated.updated_at = Utc::now();

        inner.items.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&mut self, id: &WorkItemId) -> Result<()> {
        let mut inner = self.lock().await;

        let item = inner.require_item(id)?;
        let key_id = item.key_id.clone();

        // Dropping the node takes every membership and dependency edge with
        // it; labels/releases/milestones ride on the item itself. Children
        // keep their parent_id; detaching is the caller's call.
        if let Some(node) = inner.node_map.remove(id) {
            inner.graph.remove_node(node);
        }
        inner.item_keys.remove(&key_id);
        inner.items.remove(id);

        Ok(())
    }

    async fn list(&self, filter: &WorkItemFilter) -> Result<Vec<WorkItem>> {
        let inner = self.lock().await;

        // Container filtering works off the membership edges; resolve the
        // allowed member ids up front.
        let container_members: Option<HashSet<WorkItemId>> =
            filter.container_id.as_ref().map(|container| {
                inner
                    .members_of(container, filter.relation)
                    .into_iter()
                    .map(|m| m.id)
                    .collect()
            });

        let mut items: Vec<WorkItem> = inner
            .items
            .values()
            .filter(|item| {
                if let Some(project_id) = &filter.project_id {
                    if &item.project_id != project_id {
                        return false;
                    }
                }
                if let Some(kind) = filter.kind {
                    if item.kind != kind {
                        return false;
                    }
                }
                if let Some(status) = filter.status {
                    if item.status != status {
                        return false;
                    }
                }
                if let Some(priority) = filter.priority {
                    if item.priority != priority {
                        return false;
                    }
                }
                if let Some(parent_id) = &filter.parent_id {
                    if item.parent_id.as_ref() != Some(parent_id) {
                        return false;
                    }
                }
                if let Some(members) = &container_members {
                    if !members.contains(&item.id) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        // Most recent first.
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            items.truncate(limit);
        }

        Ok(items)
    }

    // ========== Containment ==========

    async fn add_membership(
        &mut self,
        container: &WorkItemId,
        member: &WorkItemId,
        relation: WorkItemKind,
    ) -> Result<()> {
        let mut inner = self.lock().await;

        let container_item = inner.require_item(container)?;
        let member_item = inner.require_item(member)?;

        if container == member {
            return Err(ValidationError::SelfMembership.into());
        }
        if container_item.project_id != member_item.project_id {
            return Err(ValidationError::CrossProject {
                left: container_item.key_id.clone(),
                right: member_item.key_id.clone(),
            }
            .into());
        }
        crate::domain::validate_containment(container_item.kind, member_item.kind)?;

        let container_node = inner.node_map[container];
        let member_node = inner.node_map[member];

        let duplicate = inner.graph.edges(container_node).any(|edge| {
            edge.target() == member_node && *edge.weight() == RelationEdge::Member(relation)
        });
        if duplicate {
            return Err(ConflictError::DuplicateMembership {
                container: container.clone(),
                member: member.clone(),
                relation,
            }
            .into());
        }

        inner
            .graph
            .add_edge(container_node, member_node, RelationEdge::Member(relation));

        inner.refresh_rollup(container);
        Ok(())
    }

    async fn remove_membership(
        &mut self,
        container: &WorkItemId,
        member: &WorkItemId,
    ) -> Result<()> {
        let mut inner = self.lock().await;

        inner.require_item(container)?;
        inner.require_item(member)?;

        let container_node = inner.node_map[container];
        let member_node = inner.node_map[member];

        let edges: Vec<_> = inner
            .graph
            .edges(container_node)
            .filter(|edge| edge.target() == member_node && edge.weight().is_membership(None))
            .map(|edge| edge.id())
            .collect();

        if edges.is_empty() {
            return Err(Error::MembershipNotFound {
                container: container.clone(),
                member: member.clone(),
            });
        }

        for edge in edges {
            inner.graph.remove_edge(edge);
        }

        inner.refresh_rollup(container);
        Ok(())
    }

    async fn get_members(
        &self,
        container: &WorkItemId,
        relation: Option<WorkItemKind>,
    ) -> Result<Vec<WorkItem>> {
        let inner = self.lock().await;
        inner.require_item(container)?;
        Ok(inner.members_of(container, relation))
    }

    async fn get_containers(
        &self,
        member: &WorkItemId,
        relation: Option<WorkItemKind>,
    ) -> Result<Vec<WorkItem>> {
        let inner = self.lock().await;
        inner.require_item(member)?;
        Ok(inner.containers_of(member, relation))
    }

    // ========== Dependencies ==========

    async fn add_dependency(
        &mut self,
        predecessor: &WorkItemId,
        successor: &WorkItemId,
    ) -> Result<()> {
        let mut inner = self.lock().await;

        let predecessor_item = inner.require_item(predecessor)?;
        let successor_item = inner.require_item(successor)?;

        if predecessor == successor {
            return Err(ValidationError::SelfDependency.into());
        }
        if predecessor_item.project_id != successor_item.project_id {
            return Err(ValidationError::CrossProject {
                left: predecessor_item.key_id.clone(),
                right: successor_item.key_id.clone(),
            }
            .into());
        }

        let predecessor_node = inner.node_map[predecessor];
        let successor_node = inner.node_map[successor];

        let duplicate = inner.graph.edges(predecessor_node).any(|edge| {
            edge.target() == successor_node && *edge.weight() == RelationEdge::Dependency
        });
        if duplicate {
            return Err(ConflictError::DuplicateDependency {
                predecessor: predecessor.clone(),
                successor: successor.clone(),
            }
            .into());
        }

        if dependency_cycle_exists(&inner.graph, &inner.node_map, predecessor, successor) {
            return Err(ValidationError::DependencyCycle {
                predecessor: predecessor.clone(),
                successor: successor.clone(),
            }
            .into());
        }

        inner
            .graph
            .add_edge(predecessor_node, successor_node, RelationEdge::Dependency);
        Ok(())
    }

    async fn remove_dependency(
        &mut self,
        predecessor: &WorkItemId,
        successor: &WorkItemId,
    ) -> Result<()> {
        let mut inner = self.lock().await;

        inner.require_item(predecessor)?;
        inner.require_item(successor)?;

        let predecessor_node = inner.node_map[predecessor];
        let successor_node = inner.node_map[successor];

        let edge = inner
            .graph
            .edges(predecessor_node)
            .find(|edge| {
                edge.target() == successor_node && *edge.weight() == RelationEdge::Dependency
            })
            .map(|edge| edge.id())
            .ok_or_else(|| Error::DependencyNotFound {
                predecessor: predecessor.clone(),
                successor: successor.clone(),
            })?;

        inner.graph.remove_edge(edge);
        Ok(())
    }

    async fn get_predecessors(&self, id: &WorkItemId) -> Result<Vec<WorkItem>> {
        let inner = self.lock().await;
        inner.require_item(id)?;
        Ok(inner.predecessors_of(id))
    }

    async fn get_successors(&self, id: &WorkItemId) -> Result<Vec<WorkItem>> {
        let inner = self.lock().await;
        inner.require_item(id)?;
        Ok(inner.successors_of(id))
    }

    // ========== Derived state ==========

    async fn recompute_rollup(&mut self, id: &WorkItemId) -> Result<WorkItem> {
        let mut inner = self.lock().await;
        inner.require_item(id)?;
        inner.refresh_rollup(id);
        Ok(inner.items[id].clone())
    }

    async fn is_blocked(&self, id: &WorkItemId) -> Result<bool> {
        let inner = self.lock().await;
        let item = inner.require_item(id)?;

        if item.status == crate::domain::WorkItemStatus::Blocked {
            return Ok(true);
        }
        Ok(!inner.unfinished_predecessors(id).is_empty())
    }

    async fn blocked_items(&self) -> Result<Vec<(WorkItem, Vec<WorkItem>)>> {
        let inner = self.lock().await;

        let mut blocked: Vec<(WorkItem, Vec<WorkItem>)> = inner
            .items
            .values()
            .filter_map(|item| {
                let blockers = inner.unfinished_predecessors(&item.id);
                if item.status == crate::domain::WorkItemStatus::Blocked || !blockers.is_empty() {
                    Some((item.clone(), blockers))
                } else {
                    None
                }
            })
            .collect();

        blocked.sort_by(|a, b| a.0.key_id.cmp(&b.0.key_id));
        Ok(blocked)
    }

    // ========== Attachments ==========

    async fn add_label(&mut self, id: &WorkItemId, label: &str) -> Result<WorkItem> {
        let mut inner = self.lock().await;
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| Error::ItemNotFound(id.clone()))?;

        if !item.labels.iter().any(|l| l == label) {
            item.labels.push(label.to_string());
            item.updated_at = Utc::now();
        }
        Ok(item.clone())
    }

    async fn remove_label(&mut self, id: &WorkItemId, label: &str) -> Result<WorkItem> {
        let mut inner = self.lock().await;
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| Error::ItemNotFound(id.clone()))?;

        let before = item.labels.len();
        item.labels.retain(|l| l != label);
        if item.labels.len() != before {
            item.updated_at = Utc::now();
        }
        Ok(item.clone())
    }

    async fn create_release(&mut self, release: NewRelease) -> Result<Release> {
        let mut inner = self.lock().await;

        if !inner.projects.contains_key(&release.project_id) {
            return Err(Error::ProjectNotFound(release.project_id.clone()));
        }

        let id = ReleaseId::new(inner.mint_id(&format!("release:{}", release.name))?);
        let created = Release {
            id: id.clone(),
            project_id: release.project_id,
            name: release.name,
            version: release.version,
            tag: release.tag,
            status: ReleaseStatus::default(),
            released_at: None,
            description: release.description,
        };
        inner.releases.insert(id, created.clone());
        Ok(created)
    }

    async fn assign_release(&mut self, id: &WorkItemId, release: &ReleaseId) -> Result<WorkItem> {
        let mut inner = self.lock().await;

        let release_entity = inner
            .releases
            .get(release)
            .ok_or_else(|| Error::ReleaseNotFound(release.clone()))?
            .clone();
        let item = inner.require_item(id)?;
        if item.project_id != release_entity.project_id {
            return Err(ValidationError::CrossProject {
                left: item.key_id.clone(),
                right: release_entity.name,
            }
            .into());
        }

        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| Error::ItemNotFound(id.clone()))?;
        if !item.releases.contains(release) {
            item.releases.push(release.clone());
            item.updated_at = Utc::now();
        }
        Ok(item.clone())
    }

    async fn unassign_release(
        &mut self,
        id: &WorkItemId,
        release: &ReleaseId,
    ) -> Result<WorkItem> {
        let mut inner = self.lock().await;
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| Error::ItemNotFound(id.clone()))?;

        let before = item.releases.len();
        item.releases.retain(|r| r != release);
        if item.releases.len() != before {
            item.updated_at = Utc::now();
        }
        Ok(item.clone())
    }

    async fn create_milestone(&mut self, milestone: NewMilestone) -> Result<ProjectMilestone> {
        let mut inner = self.lock().await;

        if !inner.projects.contains_key(&milestone.project_id) {
            return Err(Error::ProjectNotFound(milestone.project_id.clone()));
        }

        let id = MilestoneId::new(inner.mint_id(&format!("milestone:{}", milestone.name))?);
        let created = ProjectMilestone {
            id: id.clone(),
            project_id: milestone.project_id,
            name: milestone.name,
            status: MilestoneStatus::default(),
            start_at: milestone.start_at,
            due_at: milestone.due_at,
            completed_at: None,
            description: milestone.description,
        };
        inner.milestones.insert(id, created.clone());
        Ok(created)
    }

    async fn assign_milestone(
        &mut self,
        id: &WorkItemId,
        milestone: &MilestoneId,
    ) -> Result<WorkItem> {
        let mut inner = self.lock().await;

        let milestone_entity = inner
            .milestones
            .get(milestone)
            .ok_or_else(|| Error::MilestoneNotFound(milestone.clone()))?
            .clone();
        let item = inner.require_item(id)?;
        if item.project_id != milestone_entity.project_id {
            return Err(ValidationError::CrossProject {
                left: item.key_id.clone(),
                right: milestone_entity.name,
            }
            .into());
        }

        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| Error::ItemNotFound(id.clone()))?;
        if !item.milestones.contains(milestone) {
            item.milestones.push(milestone.clone());
            item.updated_at = Utc::now();
        }
        Ok(item.clone())
    }

    async fn unassign_milestone(
        &mut self,
        id: &WorkItemId,
        milestone: &MilestoneId,
    ) -> Result<WorkItem> {
        let mut inner = self.lock().await;
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| Error::ItemNotFound(id.clone()))?;

        let before = item.milestones.len();
        item.milestones.retain(|m| m != milestone);
        if item.milestones.len() != before {
            item.updated_at = Utc::now();
        }
        Ok(item.clone())
    }

    // ========== Persistence ==========

    async fn export_snapshot(&self) -> Result<Vec<SnapshotRecord>> {
        let inner = self.lock().await;
        Ok(jsonl::export_records(&inner))
    }

    async fn import_snapshot(&mut self, records: Vec<SnapshotRecord>) -> Result<Vec<LoadWarning>> {
        let mut inner = self.lock().await;
        let path = inner.snapshot_path.clone();
        let (rebuilt, warnings) = jsonl::build_inner(records, path);
        *inner = rebuilt;
        Ok(warnings)
    }

    async fn save(&self) -> Result<()> {
        let inner = self.lock().await;
        let Some(path) = inner.snapshot_path.clone() else {
            return Ok(());
        };
        let records = jsonl::export_records(&inner);
        drop(inner);
        jsonl::save_records(&path, &records).await
    }

    async fn reload(&mut self) -> Result<()> {
        let mut inner = self.lock().await;
        let Some(path) = inner.snapshot_path.clone() else {
            return Ok(());
        };

        let (rebuilt, warnings) = if path.exists() {
            let (records, mut warnings) = jsonl::load_records(&path).await?;
            let (rebuilt, build_warnings) = jsonl::build_inner(records, Some(path));
            warnings.extend(build_warnings);
            (rebuilt, warnings)
        } else {
            (super::inner::InMemoryStoreInner::new(Some(path)), Vec::new())
        };

        for warning in &warnings {
            tracing::warn!(%warning, "snapshot reload warning");
        }
        *inner = rebuilt;
        Ok(())
    }
}
