//! Shared test infrastructure for taskdag integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use taskdag::{Edge, NewTask, Role, Status, Store, StoreQueryExt, Task, TaskId, User, UserId};
use tempfile::TempDir;

/// Test environment with automatic cleanup and a registered manager.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
    pub manager: User,
}

impl TestEnv {
    /// Create a new test environment with an initialized store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut store = Store::init(temp_dir.path()).expect("Failed to init store");
        let manager = store.add_user("boss", Role::Manager).expect("Failed to add manager");
        Self {
            temp_dir,
            store,
            manager,
        }
    }

    /// Register a regular user.
    pub fn add_user(&mut self, name: &str) -> User {
        self.store.add_user(name, Role::User).expect("Failed to add user")
    }

    /// Create a task with just a title.
    pub fn create_task(&mut self, title: &str) -> Task {
        self.store
            .create(self.manager.id, NewTask::new(title))
            .expect("Failed to create task")
    }

    /// Create a task assigned to a user.
    pub fn create_assigned(&mut self, title: &str, user: UserId) -> Task {
        self.store
            .create(self.manager.id, NewTask::new(title).assigned_to(user))
            .expect("Failed to create task")
    }

    /// Create `n` tasks titled "Task 1" .. "Task n" and return their ids.
    pub fn create_tasks(&mut self, n: usize) -> Vec<TaskId> {
        (1..=n).map(|i| self.create_task(&format!("Task {}", i)).id).collect()
    }

    /// Make `task` depend on `dependency`.
    pub fn depend(&mut self, task: TaskId, dependency: TaskId) -> Edge {
        self.store.add_edge(task, dependency).expect("Failed to add edge")
    }

    /// Mark a task completed.
    pub fn complete(&mut self, task: TaskId) -> Task {
        self.store
            .request_transition(task, Status::Completed)
            .expect("Failed to complete task")
    }

    /// Current dependency ids of a task, in insertion order.
    pub fn dependency_ids(&self, task: TaskId) -> Vec<TaskId> {
        self.store
            .edges(task)
            .expect("Failed to get edges")
            .into_iter()
            .map(|e| e.depends_on_task_id)
            .collect()
    }

    /// Current status of a task.
    pub fn status(&self, task: TaskId) -> Status {
        self.store
            .get(task)
            .expect("Failed to get task")
            .expect("Task missing")
            .status
    }

    /// Assert that a task is in the ready list.
    pub fn assert_ready(&self, task: TaskId) {
        let ready = self.store.ready().expect("Failed to get ready tasks");
        assert!(
            ready.iter().any(|t| t.id == task),
            "Expected task {} to be ready, but it wasn't. Ready tasks: {:?}",
            task,
            ready.iter().map(|t| t.id).collect::<Vec<_>>()
        );
    }

    /// Assert that a task is in the blocked list.
    pub fn assert_blocked(&self, task: TaskId) {
        let blocked = self.store.blocked().expect("Failed to get blocked tasks");
        assert!(
            blocked.iter().any(|t| t.id == task),
            "Expected task {} to be blocked, but it wasn't",
            task
        );
    }

    /// Walk every task's dependencies and panic if any cycle exists.
    pub fn assert_acyclic(&self) {
        let tasks = self.store.query().execute().expect("Failed to list tasks");
        for task in &tasks {
            let mut stack = vec![(task.id, vec![task.id])];
            while let Some((current, path)) = stack.pop() {
                for dep in self.dependency_ids(current) {
                    assert!(!path.contains(&dep), "cycle found: {:?} -> {}", path, dep);
                    let mut next = path.clone();
                    next.push(dep);
                    stack.push((dep, next));
                }
            }
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
