//! taskdag: task tracking with a cycle-safe dependency graph.
//!
//! Tasks live in SQLite and may depend on other tasks. The store refuses any
//! dependency that would close a cycle and refuses to complete a task while
//! one of its direct dependencies is still open.
//!
//! # Example
//!
//! ```no_run
//! use taskdag::{NewTask, Role, Status, Store};
//! use std::path::Path;
//!
//! // Initialize a new store
//! let mut store = Store::init(Path::new(".")).unwrap();
//! let boss = store.add_user("boss", Role::Manager).unwrap();
//!
//! // Create tasks
//! let schema = store.create(boss.id, NewTask::new("Design schema")).unwrap();
//! let api = store.create(boss.id, NewTask::new("Build API")).unwrap();
//!
//! // The API needs the schema first
//! store.add_edge(api.id, schema.id).unwrap();
//!
//! // The reverse edge would close a cycle
//! assert!(store.add_edge(schema.id, api.id).is_err());
//!
//! // Query ready work
//! let ready = store.ready().unwrap();
//! assert_eq!(ready.len(), 1);
//! assert_eq!(ready[0].id, schema.id);
//!
//! // Finish the schema, then the API
//! store.request_transition(schema.id, Status::Completed).unwrap();
//! store.request_transition(api.id, Status::Completed).unwrap();
//! ```

mod storage;
mod store;
mod types;

pub mod access;
pub mod api;
pub mod client;
pub mod daemon;
pub mod error;
pub mod graph;
pub mod protocol;
pub mod query;

// Re-export public API
pub use client::Client;
pub use daemon::{Daemon, DaemonConfig, is_daemon_running, read_pid, start_daemon};
pub use error::{ErrorKind, TaskError, format_path, kind_of, task_error};
pub use graph::{ChainNode, ForbiddenCandidate, ForbiddenReason, GraphView, SubChain, TaskSummary};
pub use protocol::{Call, Request, Response};
pub use query::{Filter, Query, StoreQueryExt};
pub use storage::{DB_FILE, TASKDAG_DIR};
pub use store::{DependencyReport, Store, TaskDetails};
pub use types::{Edge, MAX_TITLE_LEN, NewTask, Role, Status, Task, TaskId, TaskUpdate, User, UserId, ValidationError};
