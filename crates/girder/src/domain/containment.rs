//! Container/member kind rules.
//!
//! Containment is a typed many-to-many relation between work items. Which
//! kinds may hold which is a fixed table:
//!
//! | container | allowed members              |
//! |-----------|------------------------------|
//! | epic      | task, story, bug             |
//! | feature   | epic, story, task, bug       |
//! | story     | task                         |
//! | bug       | task                         |
//! | task      | (never a container)          |

use crate::domain::WorkItemKind;
use crate::error::ValidationError;

/// The member kinds a container of the given kind may hold.
///
/// Empty for kinds that are never containers.
pub fn allowed_member_kinds(container: WorkItemKind) -> &'static [WorkItemKind] {
    use WorkItemKind::{Bug, Epic, Feature, Story, Task};
    match container {
        Epic => &[Task, Story, Bug],
        Feature => &[Epic, Story, Task, Bug],
        Story => &[Task],
        Bug => &[Task],
        Task => &[],
    }
}

/// Check that `container` may hold `member`.
///
/// Rejects with [`ValidationError::NotAContainer`] when the container kind
/// holds nothing at all, and [`ValidationError::DisallowedMember`] when the
/// pairing is outside the table.
pub fn validate_containment(
    container: WorkItemKind,
    member: WorkItemKind,
) -> Result<(), ValidationError> {
    let allowed = allowed_member_kinds(container);
    if allowed.is_empty() {
        return Err(ValidationError::NotAContainer(container));
    }
    if !allowed.contains(&member) {
        return Err(ValidationError::DisallowedMember { container, member });
    }
    Ok(())
}
