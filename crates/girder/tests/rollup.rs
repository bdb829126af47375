//! Integration tests for rollup recomputation: status precedence, progress
//! averaging, empty containers, and the end-to-end epic scenario.

use girder::domain::{
    NewProject, NewWorkItem, Project, WorkItemKind, WorkItemStatus, WorkItemUpdate,
};
use girder::storage::{create_store, StoreBackend, WorkItemStore};

async fn store_with_project() -> (Box<dyn WorkItemStore>, Project) {
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

async fn rollup_epic(
    store: &mut Box<dyn WorkItemStore>,
    project: &Project,
    title: &str,
) -> girder::domain::WorkItem {
    let mut epic = NewWorkItem::new(project.id.clone(), WorkItemKind::Epic, title);
    epic.rollup_mode = true;
    store.create(epic).await.unwrap()
}

async fn task_with_status(
    store: &mut Box<dyn WorkItemStore>,
    project: &Project,
    title: &str,
    status: WorkItemStatus,
    progress: f64,
) -> girder::domain::WorkItem {
    let mut task = NewWorkItem::new(project.id.clone(), WorkItemKind::Task, title);
    task.status = status;
    task.progress_pct = progress;
    store.create(task).await.unwrap()
}

#[tokio::test]
async fn empty_container_keeps_manual_values() {
    let (mut store, project) = store_with_project().await;
    let mut epic = NewWorkItem::new(project.id.clone(), WorkItemKind::Epic, "empty");
    epic.rollup_mode = true;
    epic.status = WorkItemStatus::Ready;
    epic.progress_pct = 42.0;
    let epic = store.create(epic).await.unwrap();

    let after = store.recompute_rollup(&epic.id).await.unwrap();
    assert_eq!(after.status, WorkItemStatus::Ready);
    assert_eq!(after.progress_pct, 42.0);
}

#[tokio::test]
async fn rollup_disabled_is_a_noop() {
    let (mut store, project) = store_with_project().await;
    let epic = store
        .create(NewWorkItem::new(
            project.id.clone(),
            WorkItemKind::Epic,
            "manual",
        ))
        .await
        .unwrap();
    let done_task =
        task_with_status(&mut store, &project, "t", WorkItemStatus::Done, 100.0).await;
    store
        .add_membership(&epic.id, &done_task.id, WorkItemKind::Epic)
        .await
        .unwrap();

    let after = store.recompute_rollup(&epic.id).await.unwrap();
    assert_eq!(after.status, WorkItemStatus::NotStarted);
    assert_eq!(after.progress_pct, 0.0);
}

#[tokio::test]
async fn in_progress_member_beats_all_done() {
    let (mut store, project) = store_with_project().await;
    let epic = rollup_epic(&mut store, &project, "mixed").await;

    for (i, status) in [
        WorkItemStatus::Done,
        WorkItemStatus::Done,
        WorkItemStatus::InProgress,
    ]
    .iter()
    .enumerate()
    {
        let task =
            task_with_status(&mut store, &project, &format!("t{i}"), *status, 0.0).await;
        store
            .add_membership(&epic.id, &task.id, WorkItemKind::Epic)
            .await
            .unwrap();
    }

    let after = store.recompute_rollup(&epic.id).await.unwrap();
    assert_eq!(after.status, WorkItemStatus::InProgress);
}

#[tokio::test]
async fn blocked_member_wins_over_everything() {
    let (mut store, project) = store_with_project().await;
    let epic = rollup_epic(&mut store, &project, "stuck").await;

    for (i, status) in [
        WorkItemStatus::InProgress,
        WorkItemStatus::Blocked,
        WorkItemStatus::Done,
    ]
    .iter()
    .enumerate()
    {
        let task =
            task_with_status(&mut store, &project, &format!("t{i}"), *status, 0.0).await;
        store
            .add_membership(&epic.id, &task.id, WorkItemKind::Epic)
            .await
            .unwrap();
    }

    let after = store.recompute_rollup(&epic.id).await.unwrap();
    assert_eq!(after.status, WorkItemStatus::Blocked);
}

#[tokio::test]
async fn all_done_members_complete_the_container() {
    let (mut store, project) = store_with_project().await;
    let epic = rollup_epic(&mut store, &project, "finishing").await;

    for i in 0..2 {
        let task = task_with_status(
            &mut store,
            &project,
            &format!("t{i}"),
            WorkItemStatus::Done,
            100.0,
        )
        .await;
        store
            .add_membership(&epic.id, &task.id, WorkItemKind::Epic)
            .await
            .unwrap();
    }

    let after = store.recompute_rollup(&epic.id).await.unwrap();
    assert_eq!(after.status, WorkItemStatus::Done);
    assert!(after.completed_at.is_some());
    assert_eq!(after.progress_pct, 100.0);
}

#[tokio::test]
async fn ready_and_not_started_precedence() {
    let (mut store, project) = store_with_project().await;
    let epic = rollup_epic(&mut store, &project, "queued").await;

    let t1 = task_with_status(&mut store, &project, "t1", WorkItemStatus::Done, 100.0).await;
    let t2 = task_with_status(&mut store, &project, "t2", WorkItemStatus::Ready, 0.0).await;
    store
        .add_membership(&epic.id, &t1.id, WorkItemKind::Epic)
        .await
        .unwrap();
    store
        .add_membership(&epic.id, &t2.id, WorkItemKind::Epic)
        .await
        .unwrap();

    let after = store.recompute_rollup(&epic.id).await.unwrap();
    assert_eq!(after.status, WorkItemStatus::Ready);

    // Cancelled + done fall through to not started.
    let epic2 = rollup_epic(&mut store, &project, "leftover").await;
    let t3 = task_with_status(&mut store, &project, "t3", WorkItemStatus::Done, 100.0).await;
    let t4 =
        task_with_status(&mut store, &project, "t4", WorkItemStatus::Cancelled, 0.0).await;
    store
        .add_membership(&epic2.id, &t3.id, WorkItemKind::Epic)
        .await
        .unwrap();
    store
        .add_membership(&epic2.id, &t4.id, WorkItemKind::Epic)
        .await
        .unwrap();

    let after = store.recompute_rollup(&epic2.id).await.unwrap();
    assert_eq!(after.status, WorkItemStatus::NotStarted);
}

#[tokio::test]
async fn progress_is_averaged_and_rounded() {
    let (mut store, project) = store_with_project().await;
    let epic = rollup_epic(&mut store, &project, "thirds").await;

    for (i, progress) in [100.0, 100.0, 50.0].iter().enumerate() {
        let task = task_with_status(
            &mut store,
            &project,
            &format!("t{i}"),
            WorkItemStatus::InProgress,
            *progress,
        )
        .await;
        store
            .add_membership(&epic.id, &task.id, WorkItemKind::Epic)
            .await
            .unwrap();
    }

    let after = store.recompute_rollup(&epic.id).await.unwrap();
    // 250 / 3 = 83.33... -> one decimal place.
    assert_eq!(after.progress_pct, 83.3);
}

#[tokio::test]
async fn membership_mutation_refreshes_the_container() {
    let (mut store, project) = store_with_project().await;
    let epic = rollup_epic(&mut store, &project, "live").await;
    let t1 =
        task_with_status(&mut store, &project, "t1", WorkItemStatus::InProgress, 40.0).await;

    // Adding a member recomputes immediately; no explicit call needed.
    store
        .add_membership(&epic.id, &t1.id, WorkItemKind::Epic)
        .await
        .unwrap();
    let epic_now = store.get(&epic.id).await.unwrap().unwrap();
    assert_eq!(epic_now.status, WorkItemStatus::InProgress);
    assert_eq!(epic_now.progress_pct, 40.0);

    // Removing the only member leaves the last computed values in place.
    store.remove_membership(&epic.id, &t1.id).await.unwrap();
    let epic_now = store.get(&epic.id).await.unwrap().unwrap();
    assert_eq!(epic_now.status, WorkItemStatus::InProgress);
}

#[tokio::test]
async fn member_status_change_needs_explicit_recompute() {
    let (mut store, project) = store_with_project().await;
    let epic = rollup_epic(&mut store, &project, "stale").await;
    let t1 =
        task_with_status(&mut store, &project, "t1", WorkItemStatus::InProgress, 0.0).await;
    store
        .add_membership(&epic.id, &t1.id, WorkItemKind::Epic)
        .await
        .unwrap();

    store
        .update(
            &t1.id,
            WorkItemUpdate {
                status: Some(WorkItemStatus::Done),
                progress_pct: Some(100.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The container is a cache; it goes stale until recomputed.
    let stale = store.get(&epic.id).await.unwrap().unwrap();
    assert_eq!(stale.status, WorkItemStatus::InProgress);

    let fresh = store.recompute_rollup(&epic.id).await.unwrap();
    assert_eq!(fresh.status, WorkItemStatus::Done);
    assert_eq!(fresh.progress_pct, 100.0);
}

#[tokio::test]
async fn update_on_rollup_container_recomputes_from_members() {
    let (mut store, project) = store_with_project().await;
    let epic = rollup_epic(&mut store, &project, "overridden").await;
    let t1 =
        task_with_status(&mut store, &project, "t1", WorkItemStatus::InProgress, 10.0).await;
    store
        .add_membership(&epic.id, &t1.id, WorkItemKind::Epic)
        .await
        .unwrap();

    // A manual status write on a rollup container loses to the derived value.
    let after = store
        .update(
            &epic.id,
            WorkItemUpdate {
                status: Some(WorkItemStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(after.status, WorkItemStatus::InProgress);
    assert!(after.completed_at.is_none());
}

#[tokio::test]
async fn demo_epic_end_to_end() {
    let (mut store, project) = store_with_project().await;

    let mut e1 = NewWorkItem::new(project.id.clone(), WorkItemKind::Epic, "E1");
    e1.rollup_mode = true;
    let e1 = store.create(e1).await.unwrap();
    let t1 = store
        .create(NewWorkItem::new(
            project.id.clone(),
            WorkItemKind::Task,
            "T1",
        ))
        .await
        .unwrap();
    let t2 = store
        .create(NewWorkItem::new(
            project.id.clone(),
            WorkItemKind::Task,
            "T2",
        ))
        .await
        .unwrap();

    assert_eq!(e1.key_id, "DEMO-1");
    assert_eq!(t1.key_id, "DEMO-2");
    assert_eq!(t2.key_id, "DEMO-3");

    store
        .add_membership(&e1.id, &t1.id, WorkItemKind::Epic)
        .await
        .unwrap();
    store
        .add_membership(&e1.id, &t2.id, WorkItemKind::Epic)
        .await
        .unwrap();

    store
        .update(
            &t1.id,
            WorkItemUpdate {
                status: Some(WorkItemStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();
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

    let e1_now = store.recompute_rollup(&e1.id).await.unwrap();
    assert_eq!(e1_now.status, WorkItemStatus::InProgress);

    store
        .update(
            &t2.id,
            WorkItemUpdate {
                status: Some(WorkItemStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let e1_now = store.recompute_rollup(&e1.id).await.unwrap();
    assert_eq!(e1_now.status, WorkItemStatus::Done);
    assert!(e1_now.completed_at.is_some());
}
