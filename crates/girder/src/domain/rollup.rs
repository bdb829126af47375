//! Rollup aggregation over a container's members.
//!
//! When a container has `rollup_mode` set, its status and progress are a
//! cache of a pure function over its direct members. The functions here are
//! that pure function; the store decides when to recompute (after membership
//! mutations and on demand).

use crate::domain::{WorkItem, WorkItemStatus};

/// Aggregate a status from member statuses.
///
/// Returns `None` for an empty member set: with nothing to aggregate, the
/// container's manually-set status is left alone.
///
/// Precedence, highest first:
/// 1. any member blocked -> blocked
/// 2. any member in progress -> in progress
/// 3. all members done -> done
/// 4. any member ready -> ready
/// 5. otherwise -> not started
pub fn rollup_status(members: &[WorkItem]) -> Option<WorkItemStatus> {
    use WorkItemStatus::{Blocked, Done, InProgress, NotStarted, Ready};

    if members.is_empty() {
        return None;
    }

    if members.iter().any(|m| m.status == Blocked) {
        return Some(Blocked);
    }
    if members.iter().any(|m| m.status == InProgress) {
        return Some(InProgress);
    }
    if members.iter().all(|m| m.status == Done) {
        return Some(Done);
    }
    if members.iter().any(|m| m.status == Ready) {
        return Some(Ready);
    }
    Some(NotStarted)
}

/// Aggregate progress as the arithmetic mean of member progress, rounded to
/// one decimal place.
///
/// Returns `None` for an empty member set, leaving the container's value
/// alone.
pub fn rollup_progress(members: &[WorkItem]) -> Option<f64> {
    if members.is_empty() {
        return None;
    }

    let total: f64 = members.iter().map(|m| m.progress_pct).sum();
    let mean = total / members.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}
