//! IPC protocol types for daemon communication.
//!
//! Each line on the socket is one JSON-encoded [`Call`] from the client,
//! answered by one JSON-encoded [`Response`].

use crate::error::{TaskError, task_error};
use crate::query::Filter;
use crate::store::{DependencyReport, TaskDetails};
use crate::types::{Edge, NewTask, Status, Task, TaskId, TaskUpdate, ValidationError};
use eyre::Result;
use serde::{Deserialize, Serialize};

/// A request made on behalf of a named user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Name of the acting user; not needed for `Ping` and `Shutdown`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    pub request: Request,
}

impl Call {
    pub fn new(actor: impl Into<String>, request: Request) -> Self {
        Self {
            actor: Some(actor.into()),
            request,
        }
    }

    /// A call that needs no acting user.
    pub fn anonymous(request: Request) -> Self {
        Self { actor: None, request }
    }
}

/// Request sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Create a new task.
    CreateTask { task: NewTask },

    /// Get a task with its dependencies and dependents.
    GetTask { id: TaskId },

    /// List tasks matching a filter.
    ListTasks {
        #[serde(default)]
        filter: Filter,
    },

    /// Update an existing task.
    UpdateTask { id: TaskId, update: TaskUpdate },

    /// Set task status.
    SetStatus { id: TaskId, status: Status },

    /// Delete a task.
    DeleteTask { id: TaskId },

    /// Add dependencies, all or nothing.
    AddDependencies { id: TaskId, dependencies: Vec<TaskId> },

    /// Replace the dependency set.
    SetDependencies { id: TaskId, dependencies: Vec<TaskId> },

    /// Remove the listed dependencies.
    RemoveDependencies { id: TaskId, dependencies: Vec<TaskId> },

    /// Remove every dependency of a task.
    RemoveAllDependencies { id: TaskId },

    /// Chain plus forbidden candidates for a task.
    DependencyReport { id: TaskId },

    /// Would `candidate` as a dependency of `id` close a cycle?
    CheckCycle { id: TaskId, candidate: TaskId },

    /// Get ready tasks (all dependencies completed, still active).
    Ready,

    /// Get blocked tasks (waiting on a dependency).
    Blocked,

    /// Shutdown the daemon.
    Shutdown,

    /// Ping to check if daemon is alive.
    Ping,
}

impl Request {
    /// Whether the request can run without an acting user.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Request::Ping | Request::Shutdown)
    }
}

/// Response sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Single task response.
    Task { task: Task },

    /// Task with its neighbours.
    Details { details: TaskDetails },

    /// Multiple tasks response.
    Tasks { tasks: Vec<Task> },

    /// Dependency edges of a task.
    Edges { edges: Vec<Edge> },

    /// Number of dependency edges removed.
    Removed { count: usize },

    /// Dependency report.
    Report { report: DependencyReport },

    /// Cycle check result; `path` is the existing path when a cycle would form.
    CycleCheck {
        would_cycle: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<Vec<TaskId>>,
    },

    /// Operation succeeded.
    Ok,

    /// Pong response to ping.
    Pong,

    /// A task or user does not exist.
    NotFound { error: TaskError },

    /// The acting user may not do this.
    Forbidden { reason: String },

    /// Input failed validation.
    Invalid { error: ValidationError },

    /// The dependency would close a cycle.
    Cycle {
        task_id: TaskId,
        dependency_id: TaskId,
        path: Vec<TaskId>,
    },

    /// Completion refused while dependencies are pending.
    Blocked { task_id: TaskId, pending: Vec<TaskId> },

    /// Any other failure.
    Error { message: String },
}

impl Response {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Map a failed operation onto the matching error response.
    pub fn from_error(report: &eyre::Report) -> Self {
        match task_error(report) {
            Some(err) => Self::from(err.clone()),
            None => Self::error(
                report
                    .chain()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(": "),
            ),
        }
    }

    /// The failure carried by an error response, if this is one.
    pub fn into_error(self) -> Option<eyre::Report> {
        let err = match self {
            Response::NotFound { error } => error,
            Response::Forbidden { reason } => TaskError::Forbidden(reason),
            Response::Invalid { error } => TaskError::Validation(error),
            Response::Cycle {
                task_id,
                dependency_id,
                path,
            } => TaskError::Cycle {
                task_id,
                dependency_id,
                path,
            },
            Response::Blocked { task_id, pending } => TaskError::BlockedByDependencies { task_id, pending },
            Response::Error { message } => return Some(eyre::eyre!(message)),
            _ => return None,
        };
        Some(err.into())
    }

    /// Turn error responses into `Err`, passing everything else through.
    pub fn into_result(self) -> Result<Response> {
        if self.is_error() {
            return Err(self
                .into_error()
                .unwrap_or_else(|| eyre::eyre!("Unexpected response")));
        }
        Ok(self)
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Response::NotFound { .. }
                | Response::Forbidden { .. }
                | Response::Invalid { .. }
                | Response::Cycle { .. }
                | Response::Blocked { .. }
                | Response::Error { .. }
        )
    }
}

impl From<TaskError> for Response {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(_) | TaskError::UserNotFound(_) | TaskError::UnknownUser(_) => {
                Response::NotFound { error: err }
            }
            TaskError::Forbidden(reason) => Response::Forbidden { reason },
            TaskError::Validation(error) => Response::Invalid { error },
            TaskError::Cycle {
                task_id,
                dependency_id,
                path,
            } => Response::Cycle {
                task_id,
                dependency_id,
                path,
            },
            TaskError::BlockedByDependencies { task_id, pending } => Response::Blocked { task_id, pending },
        }
    }
}
