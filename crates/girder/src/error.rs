//! Error types for girder operations.
//!
//! The engine distinguishes three rejection classes: an entity that does not
//! exist (`*NotFound`), a structural or business-rule violation
//! ([`ValidationError`]), and a uniqueness violation ([`ConflictError`]).
//! Validators run before any mutation, so a failed operation leaves the store
//! unchanged. Conflicts are surfaced for the caller to retry; the engine
//! never retries on its own.

use crate::domain::{MilestoneId, ProjectId, ReleaseId, WorkItemId, WorkItemKind};
use std::io;
use thiserror::Error;

/// The error type for girder operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Snapshot read/write error.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] girder_jsonl::Error),

    /// Referenced project does not exist.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// Referenced work item does not exist.
    #[error("work item not found: {0}")]
    ItemNotFound(WorkItemId),

    /// Referenced release does not exist.
    #[error("release not found: {0}")]
    ReleaseNotFound(ReleaseId),

    /// Referenced milestone does not exist.
    #[error("milestone not found: {0}")]
    MilestoneNotFound(MilestoneId),

    /// No membership exists between the given container and member.
    #[error("membership not found: {container} -> {member}")]
    MembershipNotFound {
        /// The container work item.
        container: WorkItemId,
        /// The member work item.
        member: WorkItemId,
    },

    /// No dependency edge exists between the given pair.
    #[error("dependency not found: {predecessor} -> {successor}")]
    DependencyNotFound {
        /// The predecessor work item.
        predecessor: WorkItemId,
        /// The successor work item.
        successor: WorkItemId,
    },

    /// A structural or business-rule violation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A uniqueness violation.
    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

/// Structural and business-rule violations.
///
/// Each variant names the rule and carries the offending values so callers
/// can build a user-facing message without string matching.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Work item titles must be non-empty.
    #[error("title must not be empty")]
    EmptyTitle,

    /// Story kind is mandatory on stories.
    #[error("story kind is required for story work items")]
    StoryKindRequired,

    /// Story kind is meaningless on anything but a story.
    #[error("story kind can only be set on story work items, not {0}")]
    StoryKindNotAllowed(WorkItemKind),

    /// Manually set progress must lie in [0, 100].
    #[error("progress must be between 0 and 100, got {0}")]
    ProgressOutOfRange(f64),

    /// Project keys are 2-10 uppercase alphanumeric characters.
    #[error("invalid project key: {0:?}")]
    InvalidProjectKey(String),

    /// Parent/child hierarchy is restricted to tasks.
    #[error("parent-child relationships are only allowed between tasks ({child} under {parent})")]
    ParentNotTask {
        /// Kind of the child work item.
        child: WorkItemKind,
        /// Kind of the candidate parent.
        parent: WorkItemKind,
    },

    /// A work item cannot be its own parent.
    #[error("work item cannot be its own parent")]
    SelfParent,

    /// Assigning this parent would close a loop in the parent chain.
    #[error("parent assignment would create a cycle")]
    ParentCycle,

    /// A work item cannot be a member of itself.
    #[error("work item cannot be a member of itself")]
    SelfMembership,

    /// The container kind never holds members.
    #[error("{0} cannot be a container")]
    NotAContainer(WorkItemKind),

    /// The member kind is not allowed inside the container kind.
    #[error("{container} cannot contain {member}")]
    DisallowedMember {
        /// Kind of the container work item.
        container: WorkItemKind,
        /// Kind of the rejected member.
        member: WorkItemKind,
    },

    /// A work item cannot depend on itself.
    #[error("work item cannot depend on itself")]
    SelfDependency,

    /// Adding this dependency edge would close a cycle in the DAG.
    #[error("dependency {predecessor} -> {successor} would create a cycle")]
    DependencyCycle {
        /// The predecessor of the rejected edge.
        predecessor: WorkItemId,
        /// The successor of the rejected edge.
        successor: WorkItemId,
    },

    /// Related entities must belong to the same project.
    #[error("{left} and {right} belong to different projects")]
    CrossProject {
        /// Identifier of the entity being mutated.
        left: String,
        /// Identifier of the entity it references.
        right: String,
    },
}

/// Uniqueness violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConflictError {
    /// A project with this key already exists.
    #[error("project key already in use: {0}")]
    DuplicateProjectKey(String),

    /// A work item with this key already exists.
    #[error("work item key already in use: {0}")]
    DuplicateItemKey(String),

    /// This (container, member, relation) triple already exists.
    #[error("membership already exists: {container} -> {member} as {relation}")]
    DuplicateMembership {
        /// The container work item.
        container: WorkItemId,
        /// The member work item.
        member: WorkItemId,
        /// The relation of the existing triple.
        relation: WorkItemKind,
    },

    /// This dependency edge already exists.
    #[error("dependency already exists: {predecessor} -> {successor}")]
    DuplicateDependency {
        /// The predecessor work item.
        predecessor: WorkItemId,
        /// The successor work item.
        successor: WorkItemId,
    },
}

/// A specialized Result type for girder operations.
pub type Result<T> = std::result::Result<T, Error>;
