//! Role checks applied in front of the store.
//!
//! Managers may do anything. Regular users may only look at and move the
//! tasks assigned to them.

use crate::error::TaskError;
use crate::query::Filter;
use crate::types::{User, UserId};

/// Something an actor wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateTask,
    DeleteTask,
    /// Change fields other than status, or the dependency set.
    UpdateTask,
    ManageDependencies,
    ViewDependencyReport,
    CheckCycle,
    /// Read a task assigned to the given user (if any).
    ViewTask { assignee: Option<UserId> },
    /// Move a task assigned to the given user (if any) to a new status.
    ChangeStatus { assignee: Option<UserId> },
    /// List tasks, optionally restricted to one assignee.
    ListTasks { assignee: Option<UserId> },
}

/// Check whether `actor` may perform `action`.
pub fn authorize(actor: &User, action: Action) -> Result<(), TaskError> {
    if actor.is_manager() {
        return Ok(());
    }

    let denied = |reason: &str| Err(TaskError::Forbidden(reason.to_string()));
    match action {
        Action::CreateTask => denied("Only managers can create tasks."),
        Action::DeleteTask => denied("Only managers can delete tasks."),
        Action::UpdateTask => denied("Only managers can update task details."),
        Action::ManageDependencies => denied("Only managers can manage task dependencies."),
        Action::ViewDependencyReport => denied("Only managers can view dependency chains."),
        Action::CheckCycle => denied("Only managers can check dependency cycles."),
        Action::ViewTask { assignee } if assignee != Some(actor.id) => {
            denied("You can only view tasks assigned to you.")
        }
        Action::ChangeStatus { assignee } if assignee != Some(actor.id) => {
            denied("You can only update tasks assigned to you.")
        }
        Action::ListTasks { assignee: Some(other) } if other != actor.id => {
            denied("Only managers can view other users tasks.")
        }
        Action::ViewTask { .. } | Action::ChangeStatus { .. } | Action::ListTasks { .. } => Ok(()),
    }
}

/// Narrow a listing filter to what `actor` is allowed to see.
pub fn scope_filter(actor: &User, filter: Filter) -> Filter {
    if actor.is_manager() {
        filter
    } else {
        filter.assigned_to(actor.id)
    }
}
