//! Request dispatch: resolve the actor, authorize, call the store.
//!
//! Both the daemon and the CLI's local mode go through [`dispatch`], so a
//! request behaves the same whichever path it takes.

use crate::access::{self, Action};
use crate::error::TaskError;
use crate::protocol::{Call, Request, Response};
use crate::query::StoreQueryExt;
use crate::store::Store;
use crate::types::{Task, TaskId, User};
use eyre::Result;

/// Execute one call against the store.
pub fn dispatch(store: &mut Store, call: Call) -> Response {
    if call.request.is_anonymous() {
        return match call.request {
            Request::Shutdown => Response::Ok,
            _ => Response::Pong,
        };
    }

    let result = resolve_actor(store, call.actor.as_deref()).and_then(|actor| handle(store, &actor, call.request));
    match result {
        Ok(response) => response,
        Err(e) => {
            log::debug!("Request failed: {:#}", e);
            Response::from_error(&e)
        }
    }
}

fn resolve_actor(store: &Store, name: Option<&str>) -> Result<User> {
    let name = name.ok_or_else(|| TaskError::Forbidden("No acting user given.".to_string()))?;
    let user = store
        .find_user(name)?
        .ok_or_else(|| TaskError::UnknownUser(name.to_string()))?;
    Ok(user)
}

fn handle(store: &mut Store, actor: &User, request: Request) -> Result<Response> {
    log::debug!("{} -> {:?}", actor.name, request);

    let response = match request {
        Request::CreateTask { task } => {
            access::authorize(actor, Action::CreateTask)?;
            Response::Task {
                task: store.create(actor.id, task)?,
            }
        }

        Request::GetTask { id } => {
            let details = store.details(id)?;
            access::authorize(
                actor,
                Action::ViewTask {
                    assignee: details.task.assigned_to,
                },
            )?;
            Response::Details { details }
        }

        Request::ListTasks { filter } => {
            access::authorize(
                actor,
                Action::ListTasks {
                    assignee: filter.assigned_to,
                },
            )?;
            let filter = access::scope_filter(actor, filter);
            Response::Tasks {
                tasks: store.query_with_filter(&filter)?,
            }
        }

        Request::UpdateTask { id, update } => {
            access::authorize(actor, Action::UpdateTask)?;
            Response::Task {
                task: store.update(id, update)?,
            }
        }

        Request::SetStatus { id, status } => {
            let task = existing(store, id)?;
            access::authorize(
                actor,
                Action::ChangeStatus {
                    assignee: task.assigned_to,
                },
            )?;
            Response::Task {
                task: store.request_transition(id, status)?,
            }
        }

        Request::DeleteTask { id } => {
            access::authorize(actor, Action::DeleteTask)?;
            store.delete(id)?;
            Response::Ok
        }

        Request::AddDependencies { id, dependencies } => {
            access::authorize(actor, Action::ManageDependencies)?;
            store.add_edges(id, &dependencies)?;
            Response::Edges {
                edges: store.edges(id)?,
            }
        }

        Request::SetDependencies { id, dependencies } => {
            access::authorize(actor, Action::ManageDependencies)?;
            Response::Edges {
                edges: store.replace_edges(id, &dependencies)?,
            }
        }

        Request::RemoveDependencies { id, dependencies } => {
            access::authorize(actor, Action::ManageDependencies)?;
            existing(store, id)?;
            Response::Removed {
                count: store.remove_edges(id, &dependencies)?,
            }
        }

        Request::RemoveAllDependencies { id } => {
            access::authorize(actor, Action::ManageDependencies)?;
            existing(store, id)?;
            Response::Removed {
                count: store.remove_all_edges(id)?,
            }
        }

        Request::DependencyReport { id } => {
            access::authorize(actor, Action::ViewDependencyReport)?;
            Response::Report {
                report: store.dependency_report(id)?,
            }
        }

        Request::CheckCycle { id, candidate } => {
            access::authorize(actor, Action::CheckCycle)?;
            existing(store, id)?;
            existing(store, candidate)?;
            let path = store.find_cycle_path(id, candidate)?;
            Response::CycleCheck {
                would_cycle: path.is_some(),
                path,
            }
        }

        Request::Ready => Response::Tasks {
            tasks: visible(actor, store.ready()?),
        },

        Request::Blocked => Response::Tasks {
            tasks: visible(actor, store.blocked()?),
        },

        Request::Ping => Response::Pong,
        Request::Shutdown => Response::Ok,
    };

    Ok(response)
}

fn existing(store: &Store, id: TaskId) -> Result<Task> {
    Ok(store.get(id)?.ok_or(TaskError::NotFound(id))?)
}

/// Managers see every task; users only the ones assigned to them.
fn visible(actor: &User, tasks: Vec<Task>) -> Vec<Task> {
    if actor.is_manager() {
        return tasks;
    }
    tasks
        .into_iter()
        .filter(|t| t.assigned_to == Some(actor.id))
        .collect()
}
