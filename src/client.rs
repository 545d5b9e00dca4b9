//! Client for connecting to the taskdag daemon.

use crate::daemon::{DaemonConfig, is_daemon_running, start_daemon};
use crate::protocol::{Call, Request, Response};
use crate::query::Filter;
use crate::store::{DependencyReport, TaskDetails};
use crate::types::{Edge, NewTask, Status, Task, TaskId, TaskUpdate};
use eyre::{Context, Result, bail};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

/// Client for communicating with the taskdag daemon on behalf of one user.
pub struct Client {
    actor: Option<String>,
    stream: UnixStream,
}

impl Client {
    /// Connect to the daemon, optionally auto-starting it if not running.
    pub fn connect(root: &Path, auto_start: bool) -> Result<Self> {
        let config = DaemonConfig::new(root);
        let socket_path = config.socket_path();

        let stream = match UnixStream::connect(&socket_path) {
            Ok(stream) => stream,
            Err(_) if auto_start => {
                if !is_daemon_running(root) {
                    start_daemon(root).context("Failed to auto-start daemon")?;

                    let mut attempts = 0;
                    loop {
                        if attempts > 20 {
                            bail!("Daemon failed to start in time");
                        }
                        std::thread::sleep(Duration::from_millis(50));
                        if let Ok(stream) = UnixStream::connect(&socket_path) {
                            break stream;
                        }
                        attempts += 1;
                    }
                } else {
                    UnixStream::connect(&socket_path).context("Failed to connect to daemon")?
                }
            }
            Err(e) => {
                bail!("Failed to connect to daemon: {}. Is it running?", e);
            }
        };

        stream
            .set_read_timeout(Some(Duration::from_secs(30)))
            .context("Failed to set read timeout")?;

        Ok(Self {
            actor: None,
            stream,
        })
    }

    /// Act as the named user for subsequent requests.
    pub fn acting_as(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Send a request and return the raw response, error variants included.
    pub fn send(&mut self, request: Request) -> Result<Response> {
        let call = Call {
            actor: self.actor.clone(),
            request,
        };
        self.send_call(&call)
    }

    /// Send a fully formed call, whatever actor it names.
    pub fn send_call(&mut self, call: &Call) -> Result<Response> {
        let call_json = serde_json::to_string(call)?;
        writeln!(self.stream, "{}", call_json)?;
        self.stream.flush()?;

        let mut reader = BufReader::new(&self.stream);
        let mut response_line = String::new();
        reader.read_line(&mut response_line)?;
        if response_line.is_empty() {
            bail!("Daemon closed the connection");
        }

        let response: Response = serde_json::from_str(&response_line).context("Failed to parse response")?;
        Ok(response)
    }

    /// Send a request, turning error responses into errors.
    pub fn call(&mut self, request: Request) -> Result<Response> {
        self.send(request)?.into_result()
    }

    pub fn create(&mut self, task: NewTask) -> Result<Task> {
        match self.call(Request::CreateTask { task })? {
            Response::Task { task } => Ok(task),
            other => unexpected(other),
        }
    }

    pub fn get(&mut self, id: TaskId) -> Result<TaskDetails> {
        match self.call(Request::GetTask { id })? {
            Response::Details { details } => Ok(details),
            other => unexpected(other),
        }
    }

    pub fn list(&mut self, filter: Filter) -> Result<Vec<Task>> {
        match self.call(Request::ListTasks { filter })? {
            Response::Tasks { tasks } => Ok(tasks),
            other => unexpected(other),
        }
    }

    pub fn update(&mut self, id: TaskId, update: TaskUpdate) -> Result<Task> {
        match self.call(Request::UpdateTask { id, update })? {
            Response::Task { task } => Ok(task),
            other => unexpected(other),
        }
    }

    pub fn set_status(&mut self, id: TaskId, status: Status) -> Result<Task> {
        match self.call(Request::SetStatus { id, status })? {
            Response::Task { task } => Ok(task),
            other => unexpected(other),
        }
    }

    pub fn delete(&mut self, id: TaskId) -> Result<()> {
        match self.call(Request::DeleteTask { id })? {
            Response::Ok => Ok(()),
            other => unexpected(other),
        }
    }

    /// Add dependencies and return the full resulting edge list.
    pub fn add_dependencies(&mut self, id: TaskId, dependencies: Vec<TaskId>) -> Result<Vec<Edge>> {
        match self.call(Request::AddDependencies { id, dependencies })? {
            Response::Edges { edges } => Ok(edges),
            other => unexpected(other),
        }
    }

    pub fn set_dependencies(&mut self, id: TaskId, dependencies: Vec<TaskId>) -> Result<Vec<Edge>> {
        match self.call(Request::SetDependencies { id, dependencies })? {
            Response::Edges { edges } => Ok(edges),
            other => unexpected(other),
        }
    }

    pub fn remove_dependencies(&mut self, id: TaskId, dependencies: Vec<TaskId>) -> Result<usize> {
        match self.call(Request::RemoveDependencies { id, dependencies })? {
            Response::Removed { count } => Ok(count),
            other => unexpected(other),
        }
    }

    pub fn remove_all_dependencies(&mut self, id: TaskId) -> Result<usize> {
        match self.call(Request::RemoveAllDependencies { id })? {
            Response::Removed { count } => Ok(count),
            other => unexpected(other),
        }
    }

    pub fn dependency_report(&mut self, id: TaskId) -> Result<DependencyReport> {
        match self.call(Request::DependencyReport { id })? {
            Response::Report { report } => Ok(report),
            other => unexpected(other),
        }
    }

    /// Path that would close a cycle if `candidate` became a dependency of `id`.
    pub fn check_cycle(&mut self, id: TaskId, candidate: TaskId) -> Result<Option<Vec<TaskId>>> {
        match self.call(Request::CheckCycle { id, candidate })? {
            Response::CycleCheck { path, .. } => Ok(path),
            other => unexpected(other),
        }
    }

    pub fn ready(&mut self) -> Result<Vec<Task>> {
        match self.call(Request::Ready)? {
            Response::Tasks { tasks } => Ok(tasks),
            other => unexpected(other),
        }
    }

    pub fn blocked(&mut self) -> Result<Vec<Task>> {
        match self.call(Request::Blocked)? {
            Response::Tasks { tasks } => Ok(tasks),
            other => unexpected(other),
        }
    }

    /// Shutdown the daemon.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.call(Request::Shutdown)? {
            Response::Ok => Ok(()),
            other => unexpected(other),
        }
    }

    /// Ping the daemon.
    pub fn ping(&mut self) -> Result<()> {
        match self.call(Request::Ping)? {
            Response::Pong => Ok(()),
            other => unexpected(other),
        }
    }
}

fn unexpected<T>(response: Response) -> Result<T> {
    bail!("Unexpected response: {:?}", response)
}
