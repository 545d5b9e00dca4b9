//! taskdag CLI - task tracking with a cycle-safe dependency graph.

use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use taskdag::{
    Call, ChainNode, Client, Daemon, DaemonConfig, DependencyReport, Filter, ForbiddenReason, NewTask, Request,
    Response, Status, Store, Task, TaskUpdate, api, format_path, is_daemon_running, read_pid,
};

mod cli;

use cli::{Cli, Command, DependCommand, UserCommand};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskdag")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("taskdag.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_store_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Where requests go: a running daemon, or the store opened in-process.
enum Backend {
    Daemon(Client),
    Local(Store),
}

impl Backend {
    fn open(store_dir: &Path) -> Result<Self> {
        if is_daemon_running(store_dir) {
            info!("Routing through daemon for {}", store_dir.display());
            let client = Client::connect(store_dir, false).context("Failed to connect to daemon")?;
            return Ok(Backend::Daemon(client));
        }
        let store = Store::open(store_dir).context("Failed to open store")?;
        Ok(Backend::Local(store))
    }

    fn call(&mut self, call: Call) -> Result<Response> {
        let response = match self {
            Backend::Daemon(client) => client.send_call(&call)?,
            Backend::Local(store) => api::dispatch(store, call),
        };
        response.into_result()
    }
}

fn format_status(status: Status) -> ColoredString {
    match status {
        Status::Pending => "pending".normal(),
        Status::InProgress => "in_progress".yellow(),
        Status::Completed => "completed".green(),
        Status::Canceled => "canceled".dimmed(),
    }
}

fn print_task_line(task: &Task) {
    let due = task
        .due_date
        .map(|d| format!(" (due {})", d))
        .unwrap_or_default();
    println!(
        "  {} {} {}{}",
        format!("#{}", task.id).cyan(),
        format_status(task.status),
        task.title,
        due.dimmed()
    );
}

fn print_tasks(tasks: &[Task], empty: &str) {
    if tasks.is_empty() {
        println!("{}", empty.dimmed());
    } else {
        for task in tasks {
            print_task_line(task);
        }
    }
}

fn print_chain(nodes: &[ChainNode], depth: usize) {
    for node in nodes {
        let indent = "  ".repeat(depth + 1);
        println!(
            "{}{} {} {}",
            indent,
            format!("#{}", node.id).cyan(),
            format_status(node.status),
            node.title
        );
        if node.sub_dependencies.is_circular() {
            println!("{}  {}", indent, "circular dependency detected".red());
        } else {
            print_chain(node.sub_dependencies.children(), depth + 1);
        }
    }
}

fn print_report(report: &DependencyReport) {
    println!(
        "{} {} {}",
        "Dependencies of".bold(),
        format!("#{}", report.task_id).cyan(),
        report.task_title
    );
    if report.chain.is_empty() {
        println!("  {}", "none".dimmed());
    } else {
        print_chain(&report.chain, 0);
    }

    println!("{}", "Cannot be added as dependencies:".bold());
    for candidate in &report.forbidden {
        let reason = match &candidate.reason {
            ForbiddenReason::SelfReference => "the task itself".to_string(),
            ForbiddenReason::WouldCycle { path } => format!("existing path {}", format_path(path)),
        };
        println!(
            "  {} {} {}",
            format!("#{}", candidate.id).cyan(),
            candidate.title,
            reason.dimmed()
        );
    }
}

fn require_actor(cli: &Cli) -> Result<String> {
    match &cli.actor {
        Some(actor) => Ok(actor.clone()),
        None => bail!("This command needs an acting user: pass --as <name>"),
    }
}

fn run(cli: Cli) -> Result<()> {
    let store_dir = get_store_dir(&cli);
    let json = cli.json;

    match &cli.command {
        Command::Init { manager } => {
            let mut store = Store::init(&store_dir).context("Failed to initialize taskdag store")?;
            println!("{} Initialized taskdag store in {}", "✓".green(), store_dir.display());
            if let Some(name) = manager {
                let user = store.add_user(name, taskdag::Role::Manager)?;
                println!("{} Added manager {} ({})", "✓".green(), user.name, user.id);
            }
            return Ok(());
        }

        Command::User(command) => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            match command {
                UserCommand::Add { name, role } => {
                    let user = store.add_user(name, *role).context("Failed to add user")?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&user)?);
                    } else {
                        println!("{} Added {} {} ({})", "✓".green(), role.as_str(), user.name, user.id);
                    }
                }
                UserCommand::List => {
                    let users = store.users()?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&users)?);
                    } else if users.is_empty() {
                        println!("{}", "No users".dimmed());
                    } else {
                        for user in users {
                            println!("  {} {} {}", user.id.to_string().cyan(), user.name, user.role.as_str().dimmed());
                        }
                    }
                }
            }
            return Ok(());
        }

        Command::Daemon => {
            println!("{} Starting daemon for {}", "→".blue(), store_dir.display());

            let config = DaemonConfig::new(&store_dir);
            let mut daemon = Daemon::new(config).context("Failed to create daemon")?;

            let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
            rt.block_on(async { daemon.run().await }).context("Daemon error")?;
            return Ok(());
        }

        Command::DaemonStop => {
            if !is_daemon_running(&store_dir) {
                println!("{} Daemon is not running", "✗".red());
                std::process::exit(1);
            }

            let mut client = Client::connect(&store_dir, false).context("Failed to connect to daemon")?;
            client.shutdown().context("Failed to shutdown daemon")?;
            println!("{} Daemon stopped", "✓".green());
            return Ok(());
        }

        Command::DaemonStatus => {
            if is_daemon_running(&store_dir) {
                let pid = read_pid(&store_dir).map(|p| format!(" (pid {})", p)).unwrap_or_default();
                println!("{} Daemon is running{}", "✓".green(), pid);

                if let Ok(mut client) = Client::connect(&store_dir, false)
                    && client.ping().is_ok()
                {
                    println!("  {} Responding to requests", "✓".green());
                }
            } else {
                println!("{} Daemon is not running", "✗".red());
            }
            return Ok(());
        }

        _ => {}
    }

    let actor = require_actor(&cli)?;
    let request = build_request(cli.command)?;
    let mut backend = Backend::open(&store_dir)?;
    let response = backend.call(Call::new(actor, request))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    print_response(response);
    Ok(())
}

/// Turn a task command into the request it stands for.
fn build_request(command: Command) -> Result<Request> {
    let request = match command {
        Command::Create {
            title,
            description,
            due,
            assign,
            depends,
        } => {
            let mut task = NewTask::new(title).depends_on(depends);
            task.description = description;
            task.due_date = due;
            task.assigned_to = assign;
            Request::CreateTask { task }
        }

        Command::Show { id } => Request::GetTask { id },

        Command::List {
            status,
            assignee,
            due_from,
            due_to,
            title,
        } => Request::ListTasks {
            filter: Filter {
                status,
                assigned_to: assignee,
                due_from,
                due_to,
                title_contains: title,
            },
        },

        Command::Update {
            id,
            title,
            description,
            clear_description,
            due,
            clear_due,
            assign,
            unassign,
            status,
            depends,
        } => {
            let mut update = TaskUpdate::new();
            update.title = title;
            update.status = status;
            update.dependencies = depends;
            if clear_description || description.is_some() {
                update.description = Some(description);
            }
            if clear_due || due.is_some() {
                update.due_date = Some(due);
            }
            if unassign || assign.is_some() {
                update.assigned_to = Some(assign);
            }
            Request::UpdateTask { id, update }
        }

        Command::Status { id, status } => Request::SetStatus { id, status },

        Command::Delete { id } => Request::DeleteTask { id },

        Command::Depend(DependCommand::Add { id, dependencies }) => Request::AddDependencies { id, dependencies },
        Command::Depend(DependCommand::Remove { id, dependencies }) => {
            Request::RemoveDependencies { id, dependencies }
        }
        Command::Depend(DependCommand::Clear { id }) => Request::RemoveAllDependencies { id },
        Command::Depend(DependCommand::Set { id, dependencies }) => Request::SetDependencies { id, dependencies },

        Command::Chain { id } => Request::DependencyReport { id },

        Command::Check { id, candidate } => Request::CheckCycle { id, candidate },

        Command::Ready => Request::Ready,
        Command::Blocked => Request::Blocked,

        Command::Init { .. } | Command::User(_) | Command::Daemon | Command::DaemonStop | Command::DaemonStatus => {
            bail!("Not a task command")
        }
    };
    Ok(request)
}

fn print_response(response: Response) {
    match response {
        Response::Task { task } => {
            println!("{} {} {}", "✓".green(), format!("#{}", task.id).cyan(), task.title);
            println!("  {}: {}", "Status".bold(), format_status(task.status));
        }

        Response::Details { details } => {
            let task = &details.task;
            println!("{}: {}", "ID".bold(), task.id.to_string().cyan());
            println!("{}: {}", "Title".bold(), task.title);
            println!("{}: {}", "Status".bold(), format_status(task.status));
            if let Some(desc) = &task.description {
                println!("{}: {}", "Description".bold(), desc);
            }
            if let Some(due) = task.due_date {
                println!("{}: {}", "Due".bold(), due);
            }
            if let Some(assignee) = task.assigned_to {
                println!("{}: {}", "Assigned to".bold(), assignee);
            }
            println!("{}: {}", "Created by".bold(), task.created_by);
            println!("{}: {}", "Created".bold(), task.created_at);
            println!("{}: {}", "Updated".bold(), task.updated_at);
            println!("{}", "Depends on:".bold());
            print_tasks(&details.dependencies, "  none");
            println!("{}", "Required by:".bold());
            print_tasks(&details.dependents, "  none");
        }

        Response::Tasks { tasks } => print_tasks(&tasks, "No tasks found"),

        Response::Edges { edges } => {
            let ids: Vec<String> = edges.iter().map(|e| e.depends_on_task_id.to_string()).collect();
            match edges.first() {
                Some(edge) => println!(
                    "{} #{} depends on: {}",
                    "✓".green(),
                    edge.task_id,
                    ids.join(", ").cyan()
                ),
                None => println!("{} No dependencies", "✓".green()),
            }
        }

        Response::Removed { count } => println!("{} Removed {} dependencies", "✓".green(), count),

        Response::Report { report } => print_report(&report),

        Response::CycleCheck { would_cycle, path } => match path {
            Some(path) if would_cycle => println!(
                "{} Would create a cycle (existing path {})",
                "⊘".red(),
                format_path(&path)
            ),
            _ => println!("{} No cycle", "✓".green()),
        },

        Response::Ok => println!("{} Done", "✓".green()),
        Response::Pong => println!("{} Pong", "✓".green()),

        // into_result already turned these into errors
        other => println!("{:?}", other),
    }
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
