//! Domain failures raised by the store and the graph engine.
//!
//! They travel inside `eyre::Report`; use [`kind_of`] or
//! `report.downcast_ref::<TaskError>()` to make typed decisions.

use crate::types::{TaskId, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskError {
    /// Task not found.
    NotFound(TaskId),
    /// User id not found.
    UserNotFound(UserId),
    /// No user with that name.
    UnknownUser(String),
    /// Adding `task_id -> dependency_id` would close a cycle.
    Cycle {
        task_id: TaskId,
        dependency_id: TaskId,
        /// Existing path from `dependency_id` back to `task_id`
        path: Vec<TaskId>,
    },
    /// Completion requested while direct dependencies are incomplete.
    BlockedByDependencies { task_id: TaskId, pending: Vec<TaskId> },
    /// Field validation failed.
    Validation(ValidationError),
    /// The acting user may not perform the action.
    Forbidden(String),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::NotFound(id) => write!(f, "task not found: {}", id),
            TaskError::UserNotFound(id) => write!(f, "user not found: {}", id),
            TaskError::UnknownUser(name) => write!(f, "unknown user: {}", name),
            TaskError::Cycle {
                dependency_id, path, ..
            } => {
                write!(f, "cannot add dependency {}: would create circular dependency", dependency_id)?;
                if !path.is_empty() {
                    write!(f, " (existing path {})", format_path(path))?;
                }
                Ok(())
            }
            TaskError::BlockedByDependencies { task_id, pending } => write!(
                f,
                "cannot complete task {}: dependencies not yet completed: {}",
                task_id,
                pending.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
            ),
            TaskError::Validation(e) => write!(f, "validation error: {}", e),
            TaskError::Forbidden(reason) => write!(f, "unauthorized: {}", reason),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<ValidationError> for TaskError {
    fn from(e: ValidationError) -> Self {
        TaskError::Validation(e)
    }
}

/// Coarse classification used when mapping failures onto the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Cycle,
    Blocked,
    Validation,
    Forbidden,
    /// Anything that is not a domain rejection: I/O, SQLite, serialization.
    Storage,
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::NotFound(_) | TaskError::UserNotFound(_) | TaskError::UnknownUser(_) => ErrorKind::NotFound,
            TaskError::Cycle { .. } => ErrorKind::Cycle,
            TaskError::BlockedByDependencies { .. } => ErrorKind::Blocked,
            TaskError::Validation(_) => ErrorKind::Validation,
            TaskError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }
}

/// Find the domain error inside a report, looking through any context layers.
pub fn task_error(report: &eyre::Report) -> Option<&TaskError> {
    report.chain().find_map(|e| e.downcast_ref::<TaskError>())
}

/// Classify a report.
pub fn kind_of(report: &eyre::Report) -> ErrorKind {
    task_error(report).map(TaskError::kind).unwrap_or(ErrorKind::Storage)
}

/// Render a path as `4 -> 3 -> 1`.
pub fn format_path(path: &[TaskId]) -> String {
    path.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" -> ")
}
