//! Integration tests for work item CRUD, field validation, key allocation,
//! and attachments on the in-memory store.

use girder::domain::{
    NewMilestone, NewProject, NewRelease, NewWorkItem, Priority, StoryKind, WorkItemFilter,
    WorkItemId, WorkItemKind, WorkItemStatus, WorkItemUpdate,
};
use girder::error::{ConflictError, Error, ValidationError};
use girder::storage::{create_store, StoreBackend, WorkItemStore};

async fn store_with_project() -> (Box<dyn WorkItemStore>, girder::domain::Project) {
    let mut store = create_store(StoreBackend::Memory).await.unwrap();
    let project = store
        .create_project(NewProject {
            key: Some("DEMO".to_string()),
            name: "Demo".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    (store, project)
}

fn new_task(project: &girder::domain::Project, title: &str) -> NewWorkItem {
    NewWorkItem::new(project.id.clone(), WorkItemKind::Task, title)
}

// ========== Projects & keys ==========

#[tokio::test]
async fn create_project_with_explicit_key() {
    let (store, project) = store_with_project().await;
    assert_eq!(project.key.as_str(), "DEMO");

    let fetched = store.get_project(&project.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Demo");

    let by_key = store.get_project_by_key("DEMO").await.unwrap().unwrap();
    assert_eq!(by_key.id, project.id);
}

#[tokio::test]
async fn create_project_derives_key_from_name() {
    let mut store = create_store(StoreBackend::Memory).await.unwrap();
    let project = store
        .create_project(NewProject {
            key: None,
            name: "Website Redesign".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(project.key.as_str(), "WEBS");

    // Same name again gets a suffixed key.
    let second = store
        .create_project(NewProject {
            key: None,
            name: "Website Redesign".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(second.key.as_str(), "WEBS1");
}

#[tokio::test]
async fn duplicate_project_key_conflicts() {
    let (mut store, _project) = store_with_project().await;
    let result = store
        .create_project(NewProject {
            key: Some("DEMO".to_string()),
            name: "Other".to_string(),
            description: String::new(),
        })
        .await;
    assert!(matches!(
        result.unwrap_err(),
        Error::Conflict(ConflictError::DuplicateProjectKey(_))
    ));
}

#[tokio::test]
async fn malformed_project_key_rejected() {
    let mut store = create_store(StoreBackend::Memory).await.unwrap();
    let result = store
        .create_project(NewProject {
            key: Some("bad key".to_string()),
            name: "Bad".to_string(),
            description: String::new(),
        })
        .await;
    assert!(matches!(
        result.unwrap_err(),
        Error::Validation(ValidationError::InvalidProjectKey(_))
    ));
}

#[tokio::test]
async fn keys_are_sequential_per_project() {
    let (mut store, project) = store_with_project().await;

    let other = store
        .create_project(NewProject {
            key: Some("OTHER".to_string()),
            name: "Other".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();

    let a = store.create(new_task(&project, "a")).await.unwrap();
    let b = store.create(new_task(&project, "b")).await.unwrap();
    let c = store.create(new_task(&other, "c")).await.unwrap();

    assert_eq!(a.key_id, "DEMO-1");
    assert_eq!(b.key_id, "DEMO-2");
    // Each project counts independently.
    assert_eq!(c.key_id, "OTHER-1");
}

#[tokio::test]
async fn deleted_key_numbers_are_never_reused() {
    let (mut store, project) = store_with_project().await;

    let a = store.create(new_task(&project, "a")).await.unwrap();
    assert_eq!(a.key_id, "DEMO-1");
    store.delete(&a.id).await.unwrap();

    let b = store.create(new_task(&project, "b")).await.unwrap();
    assert_eq!(b.key_id, "DEMO-2");
}

#[tokio::test]
async fn next_key_requires_existing_project() {
    let mut store = create_store(StoreBackend::Memory).await.unwrap();
    let result = store
        .next_key(&girder::domain::ProjectId::new("ghost"))
        .await;
    assert!(matches!(result.unwrap_err(), Error::ProjectNotFound(_)));
}

// ========== Create ==========

#[tokio::test]
async fn create_sets_defaults_and_identity() {
    let (mut store, project) = store_with_project().await;

    let item = store.create(new_task(&project, "First task")).await.unwrap();

    assert_eq!(item.key_id, "DEMO-1");
    assert!(!item.id.as_str().is_empty());
    assert_eq!(item.kind, WorkItemKind::Task);
    assert_eq!(item.status, WorkItemStatus::NotStarted);
    assert_eq!(item.priority, Priority::Medium);
    assert_eq!(item.progress_pct, 0.0);
    assert!(item.completed_at.is_none());
    assert!(!item.rollup_mode);
}

#[tokio::test]
async fn create_in_unknown_project_fails() {
    let mut store = create_store(StoreBackend::Memory).await.unwrap();
    let result = store
        .create(NewWorkItem::new(
            girder::domain::ProjectId::new("ghost"),
            WorkItemKind::Task,
            "orphan",
        ))
        .await;
    assert!(matches!(result.unwrap_err(), Error::ProjectNotFound(_)));
}

#[tokio::test]
async fn create_story_requires_story_kind() {
    let (mut store, project) = store_with_project().await;

    let story = NewWorkItem::new(project.id.clone(), WorkItemKind::Story, "As a user");
    let result = store.create(story).await;
    assert!(matches!(
        result.unwrap_err(),
        Error::Validation(ValidationError::StoryKindRequired)
    ));

    let mut story = NewWorkItem::new(project.id.clone(), WorkItemKind::Story, "As a user");
    story.story_kind = Some(StoryKind::User);
    let created = store.create(story).await.unwrap();
    assert_eq!(created.story_kind, Some(StoryKind::User));
}

#[tokio::test]
async fn create_task_with_story_kind_fails() {
    let (mut store, project) = store_with_project().await;

    let mut task = new_task(&project, "not a story");
    task.story_kind = Some(StoryKind::Testing);
    let result = store.create(task).await;
    assert!(matches!(
        result.unwrap_err(),
        Error::Validation(ValidationError::StoryKindNotAllowed(WorkItemKind::Task))
    ));
}

#[tokio::test]
async fn create_with_done_status_stamps_completion() {
    let (mut store, project) = store_with_project().await;

    let mut task = new_task(&project, "pre-done");
    task.status = WorkItemStatus::Done;
    let item = store.create(task).await.unwrap();
    assert!(item.completed_at.is_some());
}

#[tokio::test]
async fn failed_create_burns_no_state() {
    let (mut store, project) = store_with_project().await;

    // Invalid story: validation fails before any key is allocated.
    let story = NewWorkItem::new(project.id.clone(), WorkItemKind::Story, "no kind");
    assert!(store.create(story).await.is_err());

    let item = store.create(new_task(&project, "ok")).await.unwrap();
    assert_eq!(item.key_id, "DEMO-1");
}

// ========== Update ==========

#[tokio::test]
async fn update_applies_only_present_fields() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "Original")).await.unwrap();

    let updated = store
        .update(
            &item.id,
            WorkItemUpdate {
                title: Some("Renamed".to_string()),
                status: Some(WorkItemStatus::InProgress),
                priority: Some(Priority::High),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.status, WorkItemStatus::InProgress);
    assert_eq!(updated.priority, Priority::High);
    assert_eq!(updated.description, item.description);
    assert_eq!(updated.kind, item.kind);
    assert_eq!(updated.key_id, item.key_id);
}

#[tokio::test]
async fn update_unknown_item_fails() {
    let (mut store, _project) = store_with_project().await;
    let result = store
        .update(&WorkItemId::new("ghost"), WorkItemUpdate::default())
        .await;
    assert!(matches!(result.unwrap_err(), Error::ItemNotFound(_)));
}

#[tokio::test]
async fn completion_date_follows_status() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "lifecycle")).await.unwrap();

    let done = store
        .update(
            &item.id,
            WorkItemUpdate {
                status: Some(WorkItemStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(done.completed_at.is_some());

    // Moving away from done clears the timestamp.
    let reopened = store
        .update(
            &item.id,
            WorkItemUpdate {
                status: Some(WorkItemStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(reopened.completed_at.is_none());
}

#[tokio::test]
async fn completion_date_is_stamped_once() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "stable stamp")).await.unwrap();

    let first = store
        .update(
            &item.id,
            WorkItemUpdate {
                status: Some(WorkItemStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let stamp = first.completed_at.unwrap();

    // Another update that keeps the item done must not move the stamp.
    let second = store
        .update(
            &item.id,
            WorkItemUpdate {
                title: Some("still done".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(second.completed_at, Some(stamp));
}

#[tokio::test]
async fn update_story_kind_rules_enforced() {
    let (mut store, project) = store_with_project().await;
    let task = store.create(new_task(&project, "plain task")).await.unwrap();

    let result = store
        .update(
            &task.id,
            WorkItemUpdate {
                story_kind: Some(Some(StoryKind::User)),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        result.unwrap_err(),
        Error::Validation(ValidationError::StoryKindNotAllowed(WorkItemKind::Task))
    ));

    let mut story = NewWorkItem::new(project.id.clone(), WorkItemKind::Story, "story");
    story.story_kind = Some(StoryKind::Engineering);
    let story = store.create(story).await.unwrap();

    // Clearing the story kind of a story is rejected too.
    let result = store
        .update(
            &story.id,
            WorkItemUpdate {
                story_kind: Some(None),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        result.unwrap_err(),
        Error::Validation(ValidationError::StoryKindRequired)
    ));
}

#[tokio::test]
async fn update_progress_out_of_range_rejected_and_store_untouched() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "progress")).await.unwrap();

    let result = store
        .update(
            &item.id,
            WorkItemUpdate {
                progress_pct: Some(150.0),
                title: Some("should not stick".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        result.unwrap_err(),
        Error::Validation(ValidationError::ProgressOutOfRange(_))
    ));

    let unchanged = store.get(&item.id).await.unwrap().unwrap();
    assert_eq!(unchanged.title, "progress");
    assert_eq!(unchanged.progress_pct, 0.0);
}

#[tokio::test]
async fn update_empty_title_rejected() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "titled")).await.unwrap();

    let result = store
        .update(
            &item.id,
            WorkItemUpdate {
                title: Some("  ".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        result.unwrap_err(),
        Error::Validation(ValidationError::EmptyTitle)
    ));
}

// ========== Delete & lookup ==========

#[tokio::test]
async fn delete_removes_item_and_key_lookup() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "doomed")).await.unwrap();

    store.delete(&item.id).await.unwrap();

    assert!(store.get(&item.id).await.unwrap().is_none());
    assert!(store.get_by_key("DEMO-1").await.unwrap().is_none());

    let result = store.delete(&item.id).await;
    assert!(matches!(result.unwrap_err(), Error::ItemNotFound(_)));
}

#[tokio::test]
async fn get_by_key_resolves_items() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "findable")).await.unwrap();

    let by_key = store.get_by_key(&item.key_id).await.unwrap().unwrap();
    assert_eq!(by_key.id, item.id);
    assert!(store.get_by_key("DEMO-999").await.unwrap().is_none());
}

// ========== List ==========

#[tokio::test]
async fn list_filters_by_project_kind_and_status() {
    let (mut store, project) = store_with_project().await;
    let other = store
        .create_project(NewProject {
            key: Some("OTHER".to_string()),
            name: "Other".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();

    store.create(new_task(&project, "t1")).await.unwrap();
    let t2 = store.create(new_task(&project, "t2")).await.unwrap();
    store
        .create(NewWorkItem::new(
            project.id.clone(),
            WorkItemKind::Epic,
            "e1",
        ))
        .await
        .unwrap();
    store.create(new_task(&other, "elsewhere")).await.unwrap();

    store
        .update(
            &t2.id,
            WorkItemUpdate {
                status: Some(WorkItemStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let all_demo = store
        .list(&WorkItemFilter {
            project_id: Some(project.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all_demo.len(), 3);

    let tasks = store
        .list(&WorkItemFilter {
            project_id: Some(project.id.clone()),
            kind: Some(WorkItemKind::Task),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(tasks.len(), 2);

    let in_progress = store
        .list(&WorkItemFilter {
            status: Some(WorkItemStatus::InProgress),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].key_id, "DEMO-2");
}

#[tokio::test]
async fn list_filters_by_parent_and_limit() {
    let (mut store, project) = store_with_project().await;
    let parent = store.create(new_task(&project, "parent")).await.unwrap();

    for i in 0..3 {
        let mut child = new_task(&project, &format!("child {i}"));
        child.parent_id = Some(parent.id.clone());
        store.create(child).await.unwrap();
    }

    let children = store
        .list(&WorkItemFilter {
            parent_id: Some(parent.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(children.len(), 3);

    let limited = store
        .list(&WorkItemFilter {
            parent_id: Some(parent.id.clone()),
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

// ========== Labels ==========

#[tokio::test]
async fn labels_are_idempotent() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "labeled")).await.unwrap();

    let item = store.add_label(&item.id, "backend").await.unwrap();
    assert_eq!(item.labels, vec!["backend"]);

    // Re-adding is a no-op, not a duplicate.
    let item = store.add_label(&item.id, "backend").await.unwrap();
    assert_eq!(item.labels, vec!["backend"]);

    let item = store.remove_label(&item.id, "backend").await.unwrap();
    assert!(item.labels.is_empty());

    // Removing an absent label is a no-op.
    let item = store.remove_label(&item.id, "backend").await.unwrap();
    assert!(item.labels.is_empty());
}

// ========== Releases & milestones ==========

#[tokio::test]
async fn releases_attach_and_detach() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "shippable")).await.unwrap();

    let release = store
        .create_release(NewRelease {
            project_id: project.id.clone(),
            name: "v1.0".to_string(),
            version: Some("1.0.0".to_string()),
            tag: None,
            description: String::new(),
        })
        .await
        .unwrap();

    let item = store.assign_release(&item.id, &release.id).await.unwrap();
    assert_eq!(item.releases, vec![release.id.clone()]);

    // Idempotent assign.
    let item = store.assign_release(&item.id, &release.id).await.unwrap();
    assert_eq!(item.releases.len(), 1);

    let item = store.unassign_release(&item.id, &release.id).await.unwrap();
    assert!(item.releases.is_empty());
}

#[tokio::test]
async fn cross_project_release_rejected() {
    let (mut store, project) = store_with_project().await;
    let other = store
        .create_project(NewProject {
            key: Some("OTHER".to_string()),
            name: "Other".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();

    let item = store.create(new_task(&project, "here")).await.unwrap();
    let release = store
        .create_release(NewRelease {
            project_id: other.id.clone(),
            name: "their v1".to_string(),
            version: None,
            tag: None,
            description: String::new(),
        })
        .await
        .unwrap();

    let result = store.assign_release(&item.id, &release.id).await;
    assert!(matches!(
        result.unwrap_err(),
        Error::Validation(ValidationError::CrossProject { .. })
    ));
}

#[tokio::test]
async fn milestones_attach_and_cascade_with_delete() {
    let (mut store, project) = store_with_project().await;
    let item = store.create(new_task(&project, "goal")).await.unwrap();

    let milestone = store
        .create_milestone(NewMilestone {
            project_id: project.id.clone(),
            name: "Beta".to_string(),
            start_at: None,
            due_at: None,
            description: String::new(),
        })
        .await
        .unwrap();

    store.assign_milestone(&item.id, &milestone.id).await.unwrap();

    // Deleting the item drops its attachment links; the milestone survives.
    store.delete(&item.id).await.unwrap();
    assert!(store.get(&item.id).await.unwrap().is_none());
}
