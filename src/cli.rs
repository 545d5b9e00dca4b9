//! CLI argument parsing for taskdag.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskdag::{Role, Status, TaskId, UserId};

#[derive(Parser)]
#[command(
    name = "td",
    about = "Task tracking with a cycle-safe dependency graph",
    version,
    after_help = "Logs are written to: ~/.local/share/taskdag/logs/taskdag.log"
)]
pub struct Cli {
    /// Path to the taskdag store directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Name of the user to act as
    #[arg(short = 'u', long = "as", global = true)]
    pub actor: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new taskdag store in the current directory
    Init {
        /// Register a first manager with this name
        #[arg(long)]
        manager: Option<String>,
    },

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Create a new task
    Create {
        /// Task title
        title: String,

        /// Description
        #[arg(short = 'D', long)]
        description: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,

        /// Assignee user ID
        #[arg(short, long)]
        assign: Option<UserId>,

        /// Tasks this one depends on (comma-separated IDs)
        #[arg(long, value_delimiter = ',')]
        depends: Vec<TaskId>,
    },

    /// Show a task with its dependencies and dependents
    Show {
        /// Task ID
        id: TaskId,
    },

    /// List tasks
    List {
        /// Filter by status (pending, in_progress, completed, canceled)
        #[arg(short, long)]
        status: Option<Status>,

        /// Filter by assignee user ID
        #[arg(short, long)]
        assignee: Option<UserId>,

        /// Due on or after (YYYY-MM-DD)
        #[arg(long)]
        due_from: Option<NaiveDate>,

        /// Due on or before (YYYY-MM-DD)
        #[arg(long)]
        due_to: Option<NaiveDate>,

        /// Title contains
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Update task fields
    Update {
        /// Task ID
        id: TaskId,

        #[arg(long)]
        title: Option<String>,

        #[arg(short = 'D', long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,

        /// Due date (YYYY-MM-DD)
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<NaiveDate>,

        #[arg(long)]
        clear_due: bool,

        /// Assignee user ID
        #[arg(short, long, conflicts_with = "unassign")]
        assign: Option<UserId>,

        #[arg(long)]
        unassign: bool,

        #[arg(short, long)]
        status: Option<Status>,

        /// Replace the dependency set (comma-separated IDs, empty to clear)
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        depends: Option<Vec<TaskId>>,
    },

    /// Move a task to a new status
    Status {
        /// Task ID
        id: TaskId,

        /// New status (pending, in_progress, completed, canceled)
        status: Status,
    },

    /// Delete a task
    Delete {
        /// Task ID
        id: TaskId,
    },

    /// Manage task dependencies
    #[command(subcommand)]
    Depend(DependCommand),

    /// Show the dependency chain and the tasks that may not be added
    Chain {
        /// Task ID
        id: TaskId,
    },

    /// Check whether a dependency would create a cycle
    Check {
        /// Task that would gain the dependency
        id: TaskId,

        /// Candidate dependency
        candidate: TaskId,
    },

    /// Show tasks that are ready to work on
    Ready,

    /// Show tasks waiting on dependencies
    Blocked,

    /// Run the daemon in foreground
    Daemon,

    /// Stop the running daemon
    DaemonStop,

    /// Check daemon status
    DaemonStatus,
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Register a user
    Add {
        /// User name
        name: String,

        /// Role (manager or user)
        #[arg(short, long, default_value = "user")]
        role: Role,
    },

    /// List users
    List,
}

#[derive(Subcommand)]
pub enum DependCommand {
    /// Add dependencies to a task
    Add {
        /// Task ID
        id: TaskId,

        /// Tasks that must be completed first
        #[arg(required = true)]
        dependencies: Vec<TaskId>,
    },

    /// Remove dependencies from a task
    Remove {
        /// Task ID
        id: TaskId,

        #[arg(required = true)]
        dependencies: Vec<TaskId>,
    },

    /// Remove every dependency of a task
    Clear {
        /// Task ID
        id: TaskId,
    },

    /// Replace the dependency set of a task
    Set {
        /// Task ID
        id: TaskId,

        dependencies: Vec<TaskId>,
    },
}
