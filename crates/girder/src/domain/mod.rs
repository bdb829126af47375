//! Domain types for the work-item graph engine.
//!
//! The central entity is [`WorkItem`], a single type covering tasks, epics,
//! features, stories, and bugs, discriminated by [`WorkItemKind`]. Kind,
//! project, and key are fixed at creation; the update type
//! ([`WorkItemUpdate`]) simply has no fields for them.

mod containment;
mod rollup;

pub use containment::{allowed_member_kinds, validate_containment};
pub use rollup::{rollup_progress, rollup_status};

use crate::error::ValidationError;
use crate::keys::ProjectKey;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a raw id string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw id string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_newtype!(
    /// Unique identifier for a project.
    ProjectId
);
id_newtype!(
    /// Opaque unique identifier for a work item.
    ///
    /// Distinct from the human-readable key (`PROJ-7`); the opaque id never
    /// changes and never collides, even across projects.
    WorkItemId
);
id_newtype!(
    /// Unique identifier for a release.
    ReleaseId
);
id_newtype!(
    /// Unique identifier for a project milestone.
    MilestoneId
);

/// Kind of a work item.
///
/// Fixed at creation: changing the kind would invalidate containment and
/// hierarchy rules already checked against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemKind {
    /// Smallest unit of work; the only kind that participates in
    /// parent/child hierarchy.
    Task,
    /// Large body of work containing tasks, stories, and bugs.
    Epic,
    /// Product-level grouping; the widest container.
    Feature,
    /// User-facing or internal story; requires a [`StoryKind`].
    Story,
    /// Defect.
    Bug,
}

impl fmt::Display for WorkItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Task => "task",
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::Story => "story",
            Self::Bug => "bug",
        };
        write!(f, "{s}")
    }
}

/// Status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    /// Work has not begun.
    #[default]
    NotStarted,
    /// Actively being worked on.
    InProgress,
    /// Held up, directly or by a predecessor.
    Blocked,
    /// Unblocked and waiting to be picked up.
    Ready,
    /// Finished.
    Done,
    /// Abandoned without completion.
    Cancelled,
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Ready => "ready",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Priority of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Normal.
    #[default]
    Medium,
    /// Should be picked up soon.
    High,
    /// Drop everything.
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

/// Flavor of a story. Required on stories, forbidden elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryKind {
    /// User-facing story.
    User,
    /// Internal engineering story.
    Engineering,
    /// Test-coverage story.
    Testing,
}

impl fmt::Display for StoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Engineering => "engineering",
            Self::Testing => "testing",
        };
        write!(f, "{s}")
    }
}

/// A project: the owning scope for work items, counters, releases, and
/// milestones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: ProjectId,

    /// Short uppercase key used as the prefix of work item keys.
    pub key: ProjectKey,

    /// Project name.
    pub name: String,

    /// Free-form description.
    pub description: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new project.
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Explicit project key. When `None`, a key is derived from the name.
    pub key: Option<String>,

    /// Project name.
    pub name: String,

    /// Free-form description.
    pub description: String,
}

/// A work item: the unified entity for tasks, epics, features, stories, and
/// bugs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Opaque unique identifier.
    pub id: WorkItemId,

    /// Human-readable key, `<ProjectKey>-<N>`. Unique and immutable.
    pub key_id: String,

    /// Owning project. Immutable.
    pub project_id: ProjectId,

    /// Kind discriminant. Immutable.
    pub kind: WorkItemKind,

    /// Title.
    pub title: String,

    /// Free-form description.
    pub description: String,

    /// Current status.
    pub status: WorkItemStatus,

    /// Priority.
    pub priority: Priority,

    /// Parent work item. Tasks only; the parent graph is a forest.
    pub parent_id: Option<WorkItemId>,

    /// Story flavor. Present iff `kind` is [`WorkItemKind::Story`].
    pub story_kind: Option<StoryKind>,

    /// Assignee handle (opaque to the engine).
    pub assignee: Option<String>,

    /// Reporter handle (opaque to the engine).
    pub reporter: Option<String>,

    /// Creation timestamp (system-set).
    pub created_at: DateTime<Utc>,

    /// Last-update timestamp (system-set).
    pub updated_at: DateTime<Utc>,

    /// When work started (caller-set).
    pub started_at: Option<DateTime<Utc>>,

    /// Due date.
    pub due_at: Option<NaiveDate>,

    /// Completion timestamp. Set exactly while `status` is done.
    pub completed_at: Option<DateTime<Utc>>,

    /// Progress percentage in [0, 100].
    pub progress_pct: f64,

    /// When true, status and progress are derived from members rather than
    /// authoritative.
    pub rollup_mode: bool,

    /// Source repository URL, if this item tracks code changes.
    pub repo_url: Option<String>,

    /// Working branch.
    pub branch: Option<String>,

    /// Commit that resolved the item.
    pub commit_hash: Option<String>,

    /// Attached label names.
    pub labels: Vec<String>,

    /// Attached releases.
    pub releases: Vec<ReleaseId>,

    /// Attached milestones.
    pub milestones: Vec<MilestoneId>,
}

impl WorkItem {
    /// Whether the item is finished.
    pub fn is_completed(&self) -> bool {
        self.status == WorkItemStatus::Done
    }

    /// Whether the item is past its due date and not finished.
    pub fn is_overdue(&self) -> bool {
        match self.due_at {
            Some(due) => due < Utc::now().date_naive() && !self.is_completed(),
            None => false,
        }
    }

    /// Check the item's self-consistency rules.
    ///
    /// Covers the title, the story-kind/kind pairing, and the progress range.
    /// Relationship rules (parent, containment, dependencies) are checked by
    /// the store, which can see the other end of each relation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(self.kind, &self.title, self.story_kind, self.progress_pct)
    }

    /// Apply the completion-date side effect for the current status.
    ///
    /// Runs after every status mutation, whether caller-driven or computed by
    /// rollup: entering `Done` stamps `completed_at` once; any other status
    /// clears it.
    pub fn apply_completion_timestamp(&mut self) {
        if self.status == WorkItemStatus::Done {
            if self.completed_at.is_none() {
                self.completed_at = Some(Utc::now());
            }
        } else {
            self.completed_at = None;
        }
    }
}

/// Data for creating a new work item.
///
/// Identity (id and key) is generated by the store; everything else comes
/// from the caller.
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    /// Owning project.
    pub project_id: ProjectId,

    /// Kind discriminant.
    pub kind: WorkItemKind,

    /// Title.
    pub title: String,

    /// Free-form description.
    pub description: String,

    /// Initial status.
    pub status: WorkItemStatus,

    /// Priority.
    pub priority: Priority,

    /// Parent work item (tasks only).
    pub parent_id: Option<WorkItemId>,

    /// Story flavor (stories only).
    pub story_kind: Option<StoryKind>,

    /// Assignee handle.
    pub assignee: Option<String>,

    /// Reporter handle.
    pub reporter: Option<String>,

    /// Due date.
    pub due_at: Option<NaiveDate>,

    /// Initial progress percentage.
    pub progress_pct: f64,

    /// Whether status/progress are derived from members.
    pub rollup_mode: bool,

    /// Source repository URL.
    pub repo_url: Option<String>,

    /// Working branch.
    pub branch: Option<String>,

    /// Commit hash.
    pub commit_hash: Option<String>,
}

impl NewWorkItem {
    /// A new work item with the given identity-defining fields and defaults
    /// for everything else.
    pub fn new(project_id: ProjectId, kind: WorkItemKind, title: impl Into<String>) -> Self {
        Self {
            project_id,
            kind,
            title: title.into(),
            description: String::new(),
            status: WorkItemStatus::default(),
            priority: Priority::default(),
            parent_id: None,
            story_kind: None,
            assignee: None,
            reporter: None,
            due_at: None,
            progress_pct: 0.0,
            rollup_mode: false,
            repo_url: None,
            branch: None,
            commit_hash: None,
        }
    }

    /// Check the self-consistency rules before the store accepts the item.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(self.kind, &self.title, self.story_kind, self.progress_pct)
    }
}

/// Data for updating an existing work item.
///
/// Only fields that are `Some` are applied. Double-optional fields
/// distinguish "leave alone" (`None`) from "clear" (`Some(None)`).
/// Kind, key, and project are absent on purpose: they are immutable.
#[derive(Debug, Clone, Default)]
pub struct WorkItemUpdate {
    /// New title.
    pub title: Option<String>,

    /// New description.
    pub description: Option<String>,

    /// New status.
    pub status: Option<WorkItemStatus>,

    /// New priority.
    pub priority: Option<Priority>,

    /// New parent (`Some(None)` detaches).
    pub parent_id: Option<Option<WorkItemId>>,

    /// New story flavor (`Some(None)` clears).
    pub story_kind: Option<Option<StoryKind>>,

    /// New assignee (`Some(None)` clears).
    pub assignee: Option<Option<String>>,

    /// New reporter (`Some(None)` clears).
    pub reporter: Option<Option<String>>,

    /// New started-at timestamp (`Some(None)` clears).
    pub started_at: Option<Option<DateTime<Utc>>>,

    /// New due date (`Some(None)` clears).
    pub due_at: Option<Option<NaiveDate>>,

    /// New progress percentage.
    pub progress_pct: Option<f64>,

    /// New rollup mode.
    pub rollup_mode: Option<bool>,

    /// New repository URL (`Some(None)` clears).
    pub repo_url: Option<Option<String>>,

    /// New branch (`Some(None)` clears).
    pub branch: Option<Option<String>>,

    /// New commit hash (`Some(None)` clears).
    pub commit_hash: Option<Option<String>>,
}

/// Filter for querying work items.
#[derive(Debug, Clone, Default)]
pub struct WorkItemFilter {
    /// Restrict to one project.
    pub project_id: Option<ProjectId>,

    /// Filter by kind.
    pub kind: Option<WorkItemKind>,

    /// Filter by status.
    pub status: Option<WorkItemStatus>,

    /// Filter by priority.
    pub priority: Option<Priority>,

    /// Restrict to children of this parent.
    pub parent_id: Option<WorkItemId>,

    /// Restrict to members of this container.
    pub container_id: Option<WorkItemId>,

    /// With `container_id`, restrict to members held under this relation.
    pub relation: Option<WorkItemKind>,

    /// Limit number of results.
    pub limit: Option<usize>,
}

/// A container/member relation: `container` holds `member` as `relation`.
///
/// Composite-keyed; at most one row per (container, member, relation) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// The containing work item.
    pub container_id: WorkItemId,

    /// The contained work item.
    pub member_id: WorkItemId,

    /// The relation under which the member is held.
    pub relation: WorkItemKind,
}

/// A dependency edge: `predecessor` must finish before `successor` proceeds.
///
/// Composite-keyed; at most one row per ordered pair. The edge set is kept
/// acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The item that must finish first.
    pub predecessor_id: WorkItemId,

    /// The item that waits.
    pub successor_id: WorkItemId,
}

/// Status of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// Not yet started.
    #[default]
    NotStarted,
    /// Being assembled.
    InProgress,
    /// Ready to ship.
    Ready,
    /// Shipped.
    Released,
}

/// A release: an attachment target grouping work items for a shipped version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Unique identifier.
    pub id: ReleaseId,

    /// Owning project.
    pub project_id: ProjectId,

    /// Release name.
    pub name: String,

    /// Version string.
    pub version: Option<String>,

    /// VCS tag.
    pub tag: Option<String>,

    /// Current status.
    pub status: ReleaseStatus,

    /// When the release shipped.
    pub released_at: Option<DateTime<Utc>>,

    /// Free-form description.
    pub description: String,
}

/// Data for creating a new release.
#[derive(Debug, Clone)]
pub struct NewRelease {
    /// Owning project.
    pub project_id: ProjectId,

    /// Release name.
    pub name: String,

    /// Version string.
    pub version: Option<String>,

    /// VCS tag.
    pub tag: Option<String>,

    /// Free-form description.
    pub description: String,
}

/// Status of a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    /// Not yet started.
    #[default]
    NotStarted,
    /// Underway.
    InProgress,
    /// Reached.
    Done,
    /// Missed its date.
    Slipped,
}

/// A project milestone: an attachment target for date-bound goals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMilestone {
    /// Unique identifier.
    pub id: MilestoneId,

    /// Owning project.
    pub project_id: ProjectId,

    /// Milestone name.
    pub name: String,

    /// Current status.
    pub status: MilestoneStatus,

    /// Planned start date.
    pub start_at: Option<NaiveDate>,

    /// Target date.
    pub due_at: Option<NaiveDate>,

    /// When the milestone was reached.
    pub completed_at: Option<NaiveDate>,

    /// Free-form description.
    pub description: String,
}

/// Data for creating a new milestone.
#[derive(Debug, Clone)]
pub struct NewMilestone {
    /// Owning project.
    pub project_id: ProjectId,

    /// Milestone name.
    pub name: String,

    /// Planned start date.
    pub start_at: Option<NaiveDate>,

    /// Target date.
    pub due_at: Option<NaiveDate>,

    /// Free-form description.
    pub description: String,
}

/// Shared field checks for create and update paths.
fn validate_fields(
    kind: WorkItemKind,
    title: &str,
    story_kind: Option<StoryKind>,
    progress_pct: f64,
) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }

    match (kind, story_kind) {
        (WorkItemKind::Story, None) => return Err(ValidationError::StoryKindRequired),
        (WorkItemKind::Story, Some(_)) => {}
        (other, Some(_)) => return Err(ValidationError::StoryKindNotAllowed(other)),
        (_, None) => {}
    }

    if !(0.0..=100.0).contains(&progress_pct) {
        return Err(ValidationError::ProgressOutOfRange(progress_pct));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_item(kind: WorkItemKind) -> NewWorkItem {
        NewWorkItem::new(ProjectId::new("p1"), kind, "Some work")
    }

    #[test]
    fn story_without_kind_rejected() {
        let item = new_item(WorkItemKind::Story);
        assert_eq!(item.validate(), Err(ValidationError::StoryKindRequired));
    }

    #[test]
    fn story_with_kind_accepted() {
        let mut item = new_item(WorkItemKind::Story);
        item.story_kind = Some(StoryKind::User);
        assert!(item.validate().is_ok());
    }

    #[test]
    fn task_with_story_kind_rejected() {
        let mut item = new_item(WorkItemKind::Task);
        item.story_kind = Some(StoryKind::Engineering);
        assert_eq!(
            item.validate(),
            Err(ValidationError::StoryKindNotAllowed(WorkItemKind::Task))
        );
    }

    #[test]
    fn empty_title_rejected() {
        let mut item = new_item(WorkItemKind::Task);
        item.title = "   ".to_string();
        assert_eq!(item.validate(), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn progress_out_of_range_rejected() {
        let mut item = new_item(WorkItemKind::Task);
        item.progress_pct = 101.0;
        assert!(matches!(
            item.validate(),
            Err(ValidationError::ProgressOutOfRange(_))
        ));

        item.progress_pct = -0.5;
        assert!(matches!(
            item.validate(),
            Err(ValidationError::ProgressOutOfRange(_))
        ));
    }

    #[test]
    fn progress_bounds_inclusive() {
        let mut item = new_item(WorkItemKind::Task);
        item.progress_pct = 0.0;
        assert!(item.validate().is_ok());
        item.progress_pct = 100.0;
        assert!(item.validate().is_ok());
    }

    #[test]
    fn kind_display_matches_wire_names() {
        assert_eq!(WorkItemKind::Task.to_string(), "task");
        assert_eq!(WorkItemStatus::InProgress.to_string(), "in_progress");
        assert_eq!(Priority::Urgent.to_string(), "urgent");
        assert_eq!(StoryKind::Engineering.to_string(), "engineering");
    }
}
