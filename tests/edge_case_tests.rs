//! Integration tests for edge cases and boundary conditions.

mod common;

use chrono::{Duration, Utc};
use common::TestEnv;
use taskdag::{Filter, MAX_TITLE_LEN, NewTask, Status, StoreQueryExt, TaskUpdate};

// =============================================================================
// Empty Store Operations
// =============================================================================

#[test]
fn test_empty_store_ready() {
    let env = TestEnv::new();
    assert!(env.store.ready().unwrap().is_empty());
}

#[test]
fn test_empty_store_blocked() {
    let env = TestEnv::new();
    assert!(env.store.blocked().unwrap().is_empty());
}

#[test]
fn test_empty_store_query() {
    let env = TestEnv::new();
    assert!(env.store.query().execute().unwrap().is_empty());
    assert_eq!(env.store.query().status(Status::Pending).count().unwrap(), 0);
    assert_eq!(env.store.edge_count().unwrap(), 0);
}

// =============================================================================
// Unicode and Special Characters
// =============================================================================

#[test]
fn test_unicode_title_emoji() {
    let mut env = TestEnv::new();
    let task = env.create_task("Ship it 🚀");

    let retrieved = env.store.get(task.id).unwrap().unwrap();
    assert_eq!(retrieved.title, "Ship it 🚀");
}

#[test]
fn test_unicode_title_chinese() {
    let mut env = TestEnv::new();
    let task = env.create_task("实现依赖图");
    assert_eq!(env.store.get(task.id).unwrap().unwrap().title, "实现依赖图");
}

#[test]
fn test_unicode_title_counts_characters_not_bytes() {
    let mut env = TestEnv::new();
    // 255 three-byte characters is still within the limit.
    let title = "界".repeat(MAX_TITLE_LEN);
    let task = env.create_task(&title);
    assert_eq!(task.title.chars().count(), MAX_TITLE_LEN);
}

#[test]
fn test_description_with_newlines() {
    let mut env = TestEnv::new();
    let task = env
        .store
        .create(
            env.manager.id,
            NewTask::new("Multi-line").with_description("line one\nline two\n\ttabbed"),
        )
        .unwrap();

    let retrieved = env.store.get(task.id).unwrap().unwrap();
    assert_eq!(retrieved.description.as_deref(), Some("line one\nline two\n\ttabbed"));
}

#[test]
fn test_title_with_sql_metacharacters() {
    let mut env = TestEnv::new();
    let task = env.create_task("Robert'); DROP TABLE tasks;--");

    assert_eq!(env.store.get(task.id).unwrap().unwrap().title, "Robert'); DROP TABLE tasks;--");
    assert_eq!(env.store.query().title_contains("DROP").count().unwrap(), 1);
}

#[test]
fn test_title_filter_matches_wildcards_literally() {
    let mut env = TestEnv::new();
    let percent = env.create_task("Raise coverage to 80%");
    let underscore = env.create_task("Rename user_id column");
    env.create_task("Raise coverage to 805");
    env.create_task("Rename userXid column");

    let tasks = env.store.query().title_contains("80%").execute().unwrap();
    assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![percent.id]);

    let tasks = env.store.query().title_contains("user_id").execute().unwrap();
    assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![underscore.id]);

    assert_eq!(env.store.query().title_contains("%").count().unwrap(), 1);
    assert_eq!(env.store.query().title_contains("RAISE").count().unwrap(), 2);
}

// =============================================================================
// Title Length Boundaries
// =============================================================================

#[test]
fn test_title_length_one_char() {
    let mut env = TestEnv::new();
    let task = env.create_task("x");
    assert_eq!(task.title, "x");
}

#[test]
fn test_title_length_max_valid() {
    let mut env = TestEnv::new();
    let title = "x".repeat(MAX_TITLE_LEN);
    let task = env.create_task(&title);
    assert_eq!(task.title.len(), MAX_TITLE_LEN);
}

// =============================================================================
// Update Semantics
// =============================================================================

#[test]
fn test_update_leaves_absent_fields_alone() {
    let mut env = TestEnv::new();
    let alice = env.add_user("alice");
    let due = Utc::now().date_naive() + Duration::days(3);
    let task = env
        .store
        .create(
            env.manager.id,
            NewTask::new("Task")
                .with_description("keep me")
                .with_due_date(due)
                .assigned_to(alice.id),
        )
        .unwrap();

    let updated = env.store.update(task.id, TaskUpdate::new().title("Renamed")).unwrap();

    assert_eq!(updated.description.as_deref(), Some("keep me"));
    assert_eq!(updated.due_date, Some(due));
    assert_eq!(updated.assigned_to, Some(alice.id));
    assert!(updated.updated_at >= task.updated_at);
    assert_eq!(updated.created_at, task.created_at);
}

#[test]
fn test_update_clears_nullable_fields() {
    let mut env = TestEnv::new();
    let alice = env.add_user("alice");
    let due = Utc::now().date_naive() + Duration::days(3);
    let task = env
        .store
        .create(
            env.manager.id,
            NewTask::new("Task")
                .with_description("drop me")
                .with_due_date(due)
                .assigned_to(alice.id),
        )
        .unwrap();

    let updated = env
        .store
        .update(
            task.id,
            TaskUpdate::new().description(None).due_date(None).assigned_to(None),
        )
        .unwrap();

    assert_eq!(updated.description, None);
    assert_eq!(updated.due_date, None);
    assert_eq!(updated.assigned_to, None);
    assert_eq!(env.store.get(task.id).unwrap(), Some(updated));
}

#[test]
fn test_update_json_null_clears_field() {
    let update: TaskUpdate = serde_json::from_str(r#"{"description":null,"title":"T"}"#).unwrap();
    assert_eq!(update.description, Some(None));
    assert_eq!(update.due_date, None);

    let update: TaskUpdate = serde_json::from_str(r#"{}"#).unwrap();
    assert_eq!(update, TaskUpdate::default());
}

#[test]
fn test_update_with_empty_dependency_list_clears() {
    let mut env = TestEnv::new();
    let ids = env.create_tasks(3);
    env.store.add_edges(ids[0], &[ids[1], ids[2]]).unwrap();

    env.store
        .update(ids[0], TaskUpdate::new().dependencies(Vec::new()))
        .unwrap();
    assert!(env.dependency_ids(ids[0]).is_empty());
}

#[test]
fn test_update_without_dependencies_keeps_them() {
    let mut env = TestEnv::new();
    let ids = env.create_tasks(2);
    env.depend(ids[0], ids[1]);

    env.store.update(ids[0], TaskUpdate::new().title("Renamed")).unwrap();
    assert_eq!(env.dependency_ids(ids[0]), vec![ids[1]]);
}

// =============================================================================
// Deletion
// =============================================================================

#[test]
fn test_delete_dependency_unblocks_dependent() {
    let mut env = TestEnv::new();
    let dep = env.create_task("Dependency");
    let task = env.create_task("Task");
    env.depend(task.id, dep.id);
    env.assert_blocked(task.id);

    env.store.delete(dep.id).unwrap();

    env.assert_ready(task.id);
    assert_eq!(env.store.edge_count().unwrap(), 0);
}

#[test]
fn test_delete_dependent_keeps_dependency() {
    let mut env = TestEnv::new();
    let dep = env.create_task("Dependency");
    let task = env.create_task("Task");
    env.depend(task.id, dep.id);

    env.store.delete(task.id).unwrap();

    assert!(env.store.details(dep.id).unwrap().dependents.is_empty());
    env.assert_ready(dep.id);
}

// =============================================================================
// Listing
// =============================================================================

#[test]
fn test_filter_combination() {
    let mut env = TestEnv::new();
    let alice = env.add_user("alice");
    let a = env.create_assigned("Alpha", alice.id);
    env.create_assigned("Beta", alice.id);
    env.create_task("Alpha unassigned");
    env.complete(a.id);

    let filter = Filter::new()
        .assigned_to(alice.id)
        .status(Status::Completed)
        .title_contains("Alpha");
    let tasks = env.store.query_with_filter(&filter).unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, a.id);
}

#[test]
fn test_details_order_matches_insertion() {
    let mut env = TestEnv::new();
    let ids = env.create_tasks(4);
    env.store.add_edges(ids[0], &[ids[3], ids[1], ids[2]]).unwrap();

    let details = env.store.details(ids[0]).unwrap();
    assert_eq!(
        details.dependencies.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![ids[3], ids[1], ids[2]]
    );
}

#[test]
fn test_many_dependencies() {
    let mut env = TestEnv::new();
    let ids = env.create_tasks(51);
    let (root, rest) = ids.split_first().unwrap();

    env.store.add_edges(*root, rest).unwrap();
    assert_eq!(env.dependency_ids(*root).len(), 50);
    assert_eq!(env.store.pending_dependencies(*root).unwrap().len(), 50);

    for id in rest {
        env.complete(*id);
    }
    env.complete(*root);
}
