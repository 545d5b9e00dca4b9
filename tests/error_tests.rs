//! Integration tests for error handling.
//!
//! Tests missing tasks, validation, the completion gate, and storage errors.

mod common;

use chrono::{Duration, Utc};
use common::TestEnv;
use taskdag::{
    ErrorKind, MAX_TITLE_LEN, NewTask, Role, Status, Store, TaskError, TaskUpdate, ValidationError, kind_of, task_error,
};
use tempfile::TempDir;

// =============================================================================
// Task Not Found Tests
// =============================================================================

#[test]
fn test_get_nonexistent_task_returns_none() {
    let env = TestEnv::new();
    assert!(env.store.get(404).unwrap().is_none());
}

#[test]
fn test_details_nonexistent_task_fails() {
    let env = TestEnv::new();
    let err = env.store.details(404).unwrap_err();
    assert_eq!(task_error(&err), Some(&TaskError::NotFound(404)));
}

#[test]
fn test_update_nonexistent_task_fails() {
    let mut env = TestEnv::new();
    let err = env.store.update(404, TaskUpdate::new().title("New")).unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::NotFound);
}

#[test]
fn test_transition_nonexistent_task_fails() {
    let mut env = TestEnv::new();
    let err = env.store.request_transition(404, Status::InProgress).unwrap_err();
    assert_eq!(task_error(&err), Some(&TaskError::NotFound(404)));
}

#[test]
fn test_completion_checks_nonexistent_task_fail() {
    let env = TestEnv::new();
    assert_eq!(kind_of(&env.store.can_complete(404).unwrap_err()), ErrorKind::NotFound);
    assert_eq!(
        kind_of(&env.store.pending_dependencies(404).unwrap_err()),
        ErrorKind::NotFound
    );
    assert_eq!(kind_of(&env.store.dependency_report(404).unwrap_err()), ErrorKind::NotFound);
    assert_eq!(
        kind_of(&env.store.forbidden_dependency_candidates(404).unwrap_err()),
        ErrorKind::NotFound
    );
}

#[test]
fn test_create_with_unknown_creator_fails() {
    let mut env = TestEnv::new();
    let err = env.store.create(77, NewTask::new("Orphan")).unwrap_err();
    assert_eq!(task_error(&err), Some(&TaskError::UserNotFound(77)));
}

#[test]
fn test_create_with_unknown_assignee_fails() {
    let mut env = TestEnv::new();
    let err = env
        .store
        .create(env.manager.id, NewTask::new("Task").assigned_to(77))
        .unwrap_err();
    assert_eq!(task_error(&err), Some(&TaskError::UserNotFound(77)));
}

// =============================================================================
// Validation Tests
// =============================================================================

fn validation_error(err: &eyre::Report) -> Option<&ValidationError> {
    match task_error(err) {
        Some(TaskError::Validation(v)) => Some(v),
        _ => None,
    }
}

#[test]
fn test_create_empty_title_fails() {
    let mut env = TestEnv::new();
    let err = env.store.create(env.manager.id, NewTask::new("")).unwrap_err();
    assert_eq!(validation_error(&err), Some(&ValidationError::EmptyTitle));
}

#[test]
fn test_create_whitespace_only_title_fails() {
    let mut env = TestEnv::new();
    let err = env.store.create(env.manager.id, NewTask::new("   ")).unwrap_err();
    assert_eq!(validation_error(&err), Some(&ValidationError::EmptyTitle));
}

#[test]
fn test_create_title_too_long_fails() {
    let mut env = TestEnv::new();
    let title = "x".repeat(MAX_TITLE_LEN + 1);
    let err = env.store.create(env.manager.id, NewTask::new(title)).unwrap_err();
    assert_eq!(validation_error(&err), Some(&ValidationError::TitleTooLong));
}

#[test]
fn test_create_control_chars_in_title_fails() {
    let mut env = TestEnv::new();
    let err = env
        .store
        .create(env.manager.id, NewTask::new("Bad\x07title"))
        .unwrap_err();
    assert_eq!(validation_error(&err), Some(&ValidationError::InvalidCharacters));
}

#[test]
fn test_create_due_date_in_past_fails() {
    let mut env = TestEnv::new();
    let yesterday = Utc::now().date_naive() - Duration::days(1);
    let err = env
        .store
        .create(env.manager.id, NewTask::new("Late").with_due_date(yesterday))
        .unwrap_err();
    assert_eq!(validation_error(&err), Some(&ValidationError::DueDateInPast(yesterday)));
}

#[test]
fn test_create_due_today_succeeds() {
    let mut env = TestEnv::new();
    let today = Utc::now().date_naive();
    let task = env
        .store
        .create(env.manager.id, NewTask::new("Today").with_due_date(today))
        .unwrap();
    assert_eq!(task.due_date, Some(today));
}

#[test]
fn test_update_to_empty_title_fails() {
    let mut env = TestEnv::new();
    let task = env.create_task("Valid");

    let err = env.store.update(task.id, TaskUpdate::new().title("")).unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Validation);
    assert_eq!(env.store.get(task.id).unwrap().unwrap().title, "Valid");
}

#[test]
fn test_add_duplicate_user_fails() {
    let mut env = TestEnv::new();
    let err = env.store.add_user("boss", Role::User).unwrap_err();
    assert_eq!(
        validation_error(&err),
        Some(&ValidationError::DuplicateUserName("boss".to_string()))
    );

    let err = env.store.add_user("  ", Role::User).unwrap_err();
    assert_eq!(validation_error(&err), Some(&ValidationError::EmptyUserName));
}

#[test]
fn test_parse_status_and_role() {
    assert_eq!("in_progress".parse::<Status>().unwrap(), Status::InProgress);
    assert_eq!(
        "done".parse::<Status>().unwrap_err(),
        ValidationError::InvalidStatus("done".to_string())
    );
    assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
    assert!("admin".parse::<Role>().is_err());
}

// =============================================================================
// Completion Gate Tests
// =============================================================================

#[test]
fn test_complete_with_pending_dependency_fails() {
    let mut env = TestEnv::new();
    let dep = env.create_task("Dependency");
    let task = env.create_task("Task");
    env.depend(task.id, dep.id);

    let err = env.store.request_transition(task.id, Status::Completed).unwrap_err();

    assert_eq!(
        task_error(&err),
        Some(&TaskError::BlockedByDependencies {
            task_id: task.id,
            pending: vec![dep.id],
        })
    );
    assert_eq!(env.status(task.id), Status::Pending);
}

#[test]
fn test_gate_lists_only_incomplete_dependencies() {
    let mut env = TestEnv::new();
    let ids = env.create_tasks(4);
    env.store.add_edges(ids[3], &[ids[0], ids[1], ids[2]]).unwrap();
    env.complete(ids[1]);
    env.store.request_transition(ids[2], Status::Canceled).unwrap();

    assert_eq!(env.store.pending_dependencies(ids[3]).unwrap(), vec![ids[0], ids[2]]);
    assert!(!env.store.can_complete(ids[3]).unwrap());
}

#[test]
fn test_gate_is_not_transitive() {
    let mut env = TestEnv::new();
    let ids = env.create_tasks(3);
    env.depend(ids[0], ids[1]);
    env.depend(ids[1], ids[2]);

    // Force the middle task through even though its own dependency is open.
    let db = rusqlite::Connection::open(env.temp_dir.path().join(".taskdag").join("taskdag.db")).unwrap();
    db.execute("UPDATE tasks SET status = 'completed' WHERE id = ?1", [ids[1]])
        .unwrap();
    drop(db);

    assert!(env.store.can_complete(ids[0]).unwrap());
    env.complete(ids[0]);
}

#[test]
fn test_other_transitions_not_gated() {
    let mut env = TestEnv::new();
    let dep = env.create_task("Dependency");
    let task = env.create_task("Task");
    env.depend(task.id, dep.id);

    for status in [Status::InProgress, Status::Canceled, Status::Pending] {
        let moved = env.store.request_transition(task.id, status).unwrap();
        assert_eq!(moved.status, status);
    }
}

#[test]
fn test_completed_task_can_be_reopened() {
    let mut env = TestEnv::new();
    let task = env.create_task("Task");
    env.complete(task.id);

    env.store.request_transition(task.id, Status::InProgress).unwrap();
    assert_eq!(env.status(task.id), Status::InProgress);
}

#[test]
fn test_update_status_completed_gated() {
    let mut env = TestEnv::new();
    let dep = env.create_task("Dependency");
    let task = env.create_task("Task");
    env.depend(task.id, dep.id);

    let err = env
        .store
        .update(task.id, TaskUpdate::new().title("Renamed").status(Status::Completed))
        .unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Blocked);

    // The rename was part of the rejected update.
    assert_eq!(env.store.get(task.id).unwrap().unwrap().title, "Task");
}

#[test]
fn test_error_messages() {
    let mut env = TestEnv::new();
    let dep = env.create_task("Dependency");
    let task = env.create_task("Task");
    env.depend(task.id, dep.id);

    let err = env.store.request_transition(task.id, Status::Completed).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("cannot complete task {}: dependencies not yet completed: {}", task.id, dep.id)
    );

    let err = env.store.add_edge(dep.id, task.id).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "cannot add dependency {}: would create circular dependency (existing path {} -> {})",
            task.id, task.id, dep.id
        )
    );
}

// =============================================================================
// Storage Tests
// =============================================================================

#[test]
fn test_init_creates_taskdag_directory() {
    let temp_dir = TempDir::new().unwrap();
    let _store = Store::init(temp_dir.path()).unwrap();

    assert!(temp_dir.path().join(".taskdag").is_dir());
    assert!(temp_dir.path().join(".taskdag").join("taskdag.db").is_file());
}

#[test]
fn test_open_existing_store() {
    let temp_dir = TempDir::new().unwrap();
    let task_id = {
        let mut store = Store::init(temp_dir.path()).unwrap();
        let boss = store.add_user("boss", Role::Manager).unwrap();
        store.create(boss.id, NewTask::new("Persisted")).unwrap().id
    };

    let store = Store::open(temp_dir.path()).unwrap();
    assert_eq!(store.root(), temp_dir.path());
    assert_eq!(store.get(task_id).unwrap().unwrap().title, "Persisted");
}

#[test]
fn test_open_nonexistent_store_fails() {
    let temp_dir = TempDir::new().unwrap();
    let err = Store::open(temp_dir.path()).err().unwrap();
    assert_eq!(kind_of(&err), ErrorKind::Storage);
    assert!(err.to_string().contains("td init"));
}
