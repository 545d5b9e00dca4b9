//! High-level store API for taskdag.
//!
//! Every mutation runs in a single write transaction: validation reads and the
//! writes they guard see the same state, and any error drops the transaction
//! so nothing is applied. Read-only graph queries run against a snapshot.

use crate::error::TaskError;
use crate::graph::{self, ChainNode, ForbiddenCandidate};
use crate::storage::{self, SqlGraph, Storage};
use crate::types::{Edge, NewTask, Role, Status, Task, TaskId, TaskUpdate, User, UserId, ValidationError};
use chrono::{DateTime, SubsecRound, Utc};
use eyre::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A task together with its direct neighbours in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub task: Task,
    /// Tasks this one depends on
    pub dependencies: Vec<Task>,
    /// Tasks that depend on this one
    pub dependents: Vec<Task>,
}

/// Diagnostic view of a task's place in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub task_id: TaskId,
    pub task_title: String,
    /// Current dependencies, recursively expanded
    pub chain: Vec<ChainNode>,
    /// Tasks that would create a cycle if added as dependencies
    pub forbidden: Vec<ForbiddenCandidate>,
}

/// The main taskdag store.
pub struct Store {
    storage: Storage,
}

impl Store {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let storage = Storage::init(root)?;
        Ok(Self { storage })
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        let storage = Storage::open(root)?;
        Ok(Self { storage })
    }

    /// Directory the store was opened in.
    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Register a user.
    pub fn add_user(&mut self, name: &str, role: Role) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TaskError::Validation(ValidationError::EmptyUserName).into());
        }

        let tx = self.storage.write()?;
        if storage::find_user_by_name(&tx, name)?.is_some() {
            return Err(TaskError::Validation(ValidationError::DuplicateUserName(name.to_string())).into());
        }
        let user = storage::insert_user(&tx, name, role, now())?;
        tx.commit().context("Failed to commit user")?;

        log::info!("Added {} {} ({})", role.as_str(), user.name, user.id);
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        storage::get_user(self.storage.conn(), id)
    }

    pub fn find_user(&self, name: &str) -> Result<Option<User>> {
        storage::find_user_by_name(self.storage.conn(), name)
    }

    pub fn users(&self) -> Result<Vec<User>> {
        storage::list_users(self.storage.conn())
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Create a task, together with its initial dependencies.
    pub fn create(&mut self, created_by: UserId, new: NewTask) -> Result<Task> {
        let now = now();
        new.validate(now.date_naive()).map_err(TaskError::Validation)?;

        let tx = self.storage.write()?;
        if !storage::user_exists(&tx, created_by)? {
            return Err(TaskError::UserNotFound(created_by).into());
        }
        if let Some(assignee) = new.assigned_to {
            ensure_user(&tx, assignee)?;
        }

        let task = storage::insert_task(&tx, created_by, &new, now)?;
        for &dep in &new.dependencies {
            link(&tx, task.id, dep, now)?;
        }
        tx.commit().context("Failed to commit new task")?;

        log::info!("Created task {} '{}'", task.id, task.title);
        Ok(task)
    }

    /// Get a task by ID.
    pub fn get(&self, id: TaskId) -> Result<Option<Task>> {
        storage::get_task(self.storage.conn(), id)
    }

    /// Get a task with its dependencies and dependents.
    pub fn details(&self, id: TaskId) -> Result<TaskDetails> {
        let tx = self.storage.snapshot()?;
        let task = storage::get_task(&tx, id)?.ok_or(TaskError::NotFound(id))?;
        let dependencies = storage::dependency_tasks(&tx, id)?;
        let dependents = storage::dependent_tasks(&tx, id)?;
        Ok(TaskDetails {
            task,
            dependencies,
            dependents,
        })
    }

    /// Update a task's fields and, if given, replace its dependency set.
    ///
    /// A requested transition to `completed` is checked against the
    /// dependency set the update leaves behind.
    pub fn update(&mut self, id: TaskId, update: TaskUpdate) -> Result<Task> {
        let now = now();
        update.validate(now.date_naive()).map_err(TaskError::Validation)?;

        let tx = self.storage.write()?;
        let existing = storage::get_task(&tx, id)?.ok_or(TaskError::NotFound(id))?;
        if let Some(Some(assignee)) = update.assigned_to {
            ensure_user(&tx, assignee)?;
        }

        let updated = Task {
            title: update.title.unwrap_or(existing.title),
            description: update.description.unwrap_or(existing.description),
            status: update.status.unwrap_or(existing.status),
            due_date: update.due_date.unwrap_or(existing.due_date),
            assigned_to: update.assigned_to.unwrap_or(existing.assigned_to),
            updated_at: now,
            ..existing
        };

        if let Some(deps) = &update.dependencies {
            replace_links(&tx, id, deps, now)?;
        }
        if update.status == Some(Status::Completed) {
            ensure_can_complete(&tx, id)?;
        }

        storage::write_task(&tx, &updated)?;
        tx.commit().context("Failed to commit task update")?;

        log::info!("Updated task {}", id);
        Ok(updated)
    }

    /// Delete a task and every edge touching it.
    pub fn delete(&mut self, id: TaskId) -> Result<()> {
        let tx = self.storage.write()?;
        if !storage::delete_task(&tx, id)? {
            return Err(TaskError::NotFound(id).into());
        }
        tx.commit().context("Failed to commit task deletion")?;

        log::info!("Deleted task {}", id);
        Ok(())
    }

    /// Active tasks whose dependencies are all completed.
    pub fn ready(&self) -> Result<Vec<Task>> {
        storage::ready_tasks(self.storage.conn())
    }

    /// Active tasks waiting on at least one dependency.
    pub fn blocked(&self) -> Result<Vec<Task>> {
        storage::blocked_tasks(self.storage.conn())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Whether every direct dependency of the task is completed.
    pub fn can_complete(&self, id: TaskId) -> Result<bool> {
        let tx = self.storage.snapshot()?;
        ensure_task(&tx, id)?;
        graph::can_complete(&SqlGraph::new(&tx), id)
    }

    /// Direct dependencies of the task that are not completed yet.
    pub fn pending_dependencies(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let tx = self.storage.snapshot()?;
        ensure_task(&tx, id)?;
        graph::pending_dependencies(&SqlGraph::new(&tx), id)
    }

    /// Move a task to a new status. Entering `completed` requires every
    /// direct dependency to be completed; all other moves are allowed.
    pub fn request_transition(&mut self, id: TaskId, status: Status) -> Result<Task> {
        let now = now();
        let tx = self.storage.write()?;
        let existing = storage::get_task(&tx, id)?.ok_or(TaskError::NotFound(id))?;

        if status == Status::Completed {
            ensure_can_complete(&tx, id)?;
        }

        storage::set_status(&tx, id, status, now)?;
        tx.commit().context("Failed to commit status change")?;

        log::info!("Task {} moved from {} to {}", id, existing.status, status);
        Ok(Task {
            status,
            updated_at: now,
            ..existing
        })
    }

    // -----------------------------------------------------------------------
    // Dependency graph
    // -----------------------------------------------------------------------

    /// Check if making `task_id` depend on `candidate` would create a cycle.
    pub fn would_create_cycle(&self, task_id: TaskId, candidate: TaskId) -> Result<bool> {
        let tx = self.storage.snapshot()?;
        graph::would_create_cycle(&SqlGraph::new(&tx), task_id, candidate)
    }

    /// Path from `candidate` back to `task_id`, if one exists.
    pub fn find_cycle_path(&self, task_id: TaskId, candidate: TaskId) -> Result<Option<Vec<TaskId>>> {
        let tx = self.storage.snapshot()?;
        graph::find_cycle_path(&SqlGraph::new(&tx), task_id, candidate)
    }

    /// Make `task_id` depend on `dependency_id`. Adding an existing edge
    /// returns it unchanged.
    pub fn add_edge(&mut self, task_id: TaskId, dependency_id: TaskId) -> Result<Edge> {
        let tx = self.storage.write()?;
        let edge = link(&tx, task_id, dependency_id, now())?;
        tx.commit().context("Failed to commit dependency")?;
        Ok(edge)
    }

    /// Add several dependencies at once; either all are added or none.
    pub fn add_edges(&mut self, task_id: TaskId, dependency_ids: &[TaskId]) -> Result<Vec<Edge>> {
        let now = now();
        let tx = self.storage.write()?;
        let mut edges = Vec::with_capacity(dependency_ids.len());
        for &dep in dependency_ids {
            edges.push(link(&tx, task_id, dep, now)?);
        }
        tx.commit().context("Failed to commit dependencies")?;
        Ok(edges)
    }

    /// Remove one dependency. Removing a missing edge is a no-op.
    pub fn remove_edge(&mut self, task_id: TaskId, dependency_id: TaskId) -> Result<usize> {
        self.remove_edges(task_id, &[dependency_id])
    }

    /// Remove the listed dependencies, returning how many edges existed.
    pub fn remove_edges(&mut self, task_id: TaskId, dependency_ids: &[TaskId]) -> Result<usize> {
        let tx = self.storage.write()?;
        let mut removed = 0;
        for &dep in dependency_ids {
            removed += storage::delete_edge(&tx, task_id, dep)?;
        }
        tx.commit().context("Failed to commit dependency removal")?;

        log::debug!("Removed {} dependencies from task {}", removed, task_id);
        Ok(removed)
    }

    /// Remove every dependency of a task.
    pub fn remove_all_edges(&mut self, task_id: TaskId) -> Result<usize> {
        let tx = self.storage.write()?;
        let removed = storage::delete_all_edges(&tx, task_id)?;
        tx.commit().context("Failed to commit dependency removal")?;

        log::debug!("Removed all {} dependencies from task {}", removed, task_id);
        Ok(removed)
    }

    /// Replace the dependency set of a task. On any failure the previous set
    /// stays in place.
    pub fn replace_edges(&mut self, task_id: TaskId, dependency_ids: &[TaskId]) -> Result<Vec<Edge>> {
        let tx = self.storage.write()?;
        ensure_task(&tx, task_id)?;
        let edges = replace_links(&tx, task_id, dependency_ids, now())?;
        tx.commit().context("Failed to commit dependency replacement")?;
        Ok(edges)
    }

    /// Total number of dependency edges in the store.
    pub fn edge_count(&self) -> Result<usize> {
        storage::count_edges(self.storage.conn())
    }

    /// Direct dependency edges of a task, in insertion order.
    pub fn edges(&self, task_id: TaskId) -> Result<Vec<Edge>> {
        storage::edges_from(self.storage.conn(), task_id)
    }

    /// Recursively expanded dependencies of a task.
    pub fn build_dependency_chain(&self, task_id: TaskId) -> Result<Vec<ChainNode>> {
        let tx = self.storage.snapshot()?;
        graph::build_dependency_chain(&SqlGraph::new(&tx), task_id)
    }

    /// Tasks that may not become dependencies of `task_id`.
    pub fn forbidden_dependency_candidates(&self, task_id: TaskId) -> Result<Vec<ForbiddenCandidate>> {
        let tx = self.storage.snapshot()?;
        graph::forbidden_dependency_candidates(&SqlGraph::new(&tx), task_id)
    }

    /// Chain and forbidden candidates, read from one snapshot.
    pub fn dependency_report(&self, task_id: TaskId) -> Result<DependencyReport> {
        let tx = self.storage.snapshot()?;
        let task = storage::get_task(&tx, task_id)?.ok_or(TaskError::NotFound(task_id))?;
        let graph = SqlGraph::new(&tx);

        Ok(DependencyReport {
            task_id,
            task_title: task.title,
            chain: graph::build_dependency_chain(&graph, task_id)?,
            forbidden: graph::forbidden_dependency_candidates(&graph, task_id)?,
        })
    }
}

/// Truncated to the precision the database keeps.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn ensure_task(conn: &Connection, id: TaskId) -> Result<()> {
    if !storage::task_exists(conn, id)? {
        return Err(TaskError::NotFound(id).into());
    }
    Ok(())
}

fn ensure_user(conn: &Connection, id: UserId) -> Result<()> {
    if !storage::user_exists(conn, id)? {
        return Err(TaskError::UserNotFound(id).into());
    }
    Ok(())
}

fn ensure_can_complete(conn: &Connection, id: TaskId) -> Result<()> {
    let pending = graph::pending_dependencies(&SqlGraph::new(conn), id)?;
    if !pending.is_empty() {
        return Err(TaskError::BlockedByDependencies { task_id: id, pending }.into());
    }
    Ok(())
}

/// Add one edge inside an open transaction, rejecting cycles.
fn link(conn: &Connection, task_id: TaskId, dependency_id: TaskId, now: DateTime<Utc>) -> Result<Edge> {
    ensure_task(conn, task_id)?;
    ensure_task(conn, dependency_id)?;

    if let Some(existing) = storage::get_edge(conn, task_id, dependency_id)? {
        return Ok(existing);
    }

    let graph = SqlGraph::new(conn);
    if let Some(path) = graph::find_cycle_path(&graph, task_id, dependency_id)? {
        log::info!(
            "Rejected dependency {} -> {}: existing path {:?}",
            task_id,
            dependency_id,
            path
        );
        return Err(TaskError::Cycle {
            task_id,
            dependency_id,
            path,
        }
        .into());
    }

    storage::insert_edge(conn, task_id, dependency_id, now)
}

/// Swap the outgoing edges of `task_id` for `dependency_ids` inside an open
/// transaction. Each new edge is checked against the ones added before it.
fn replace_links(
    conn: &Connection,
    task_id: TaskId,
    dependency_ids: &[TaskId],
    now: DateTime<Utc>,
) -> Result<Vec<Edge>> {
    storage::delete_all_edges(conn, task_id)?;

    let mut edges: Vec<Edge> = Vec::with_capacity(dependency_ids.len());
    for &dep in dependency_ids {
        let edge = link(conn, task_id, dep, now)?;
        if !edges.iter().any(|e| e.depends_on_task_id == dep) {
            edges.push(edge);
        }
    }

    log::debug!("Replaced dependencies of task {} with {:?}", task_id, dependency_ids);
    Ok(edges)
}
