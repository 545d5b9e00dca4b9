//! Background daemon for shared access to a taskdag store.
//!
//! The daemon owns a single [`Store`] and runs every request through it one
//! at a time, on top of the serialization SQLite already gives writers.
//! Each connection is its own tokio task reading newline-delimited calls.

use crate::api;
use crate::protocol::{Call, Request, Response};
use crate::storage::TASKDAG_DIR;
use crate::store::Store;
use eyre::{Context, Result, eyre};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};

const SOCKET_FILE: &str = "daemon.sock";
const PID_FILE: &str = "daemon.pid";

/// Calls waiting for the store before senders block.
const QUEUE_DEPTH: usize = 100;

/// Wake-up interval for noticing a raised shutdown flag.
const SHUTDOWN_POLL_MS: u64 = 100;

/// Where a daemon keeps its socket and PID file.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Store root; the files live in its `.taskdag` directory.
    pub root: PathBuf,
}

impl DaemonConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.file(SOCKET_FILE)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.file(PID_FILE)
    }

    fn file(&self, name: &str) -> PathBuf {
        self.root.join(TASKDAG_DIR).join(name)
    }

    /// Drop the socket and PID file, ignoring ones already gone.
    fn remove_files(&self) {
        for path in [self.socket_path(), self.pid_path()] {
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                log::warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}

/// A decoded call plus the slot its reply goes back through.
type Job = (Call, oneshot::Sender<Response>);

/// Serves one store over a Unix socket.
pub struct Daemon {
    config: DaemonConfig,
    store: Store,
    shutdown: Arc<AtomicBool>,
}

impl Daemon {
    /// Open the store under `config.root`. Fails if it was never initialized.
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let store = Store::open(&config.root).context("Cannot open store for daemon")?;
        Ok(Self {
            config,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Serve until a `Shutdown` call has been answered.
    ///
    /// Must be awaited inside a tokio runtime with IO and timers enabled.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self.bind()?;
        let (tx, mut rx) = mpsc::channel::<Job>(QUEUE_DEPTH);
        tokio::spawn(accept_connections(listener, tx, Arc::clone(&self.shutdown)));

        let mut poll = tokio::time::interval(Duration::from_millis(SHUTDOWN_POLL_MS));
        while !self.shutdown.load(Ordering::Relaxed) {
            tokio::select! {
                Some((call, reply)) = rx.recv() => {
                    let response = api::dispatch(&mut self.store, call);
                    // The connection may already be gone.
                    let _ = reply.send(response);
                }

                _ = poll.tick() => {}
            }
        }

        log::info!("Daemon for {} stopping", self.config.root.display());
        self.config.remove_files();
        Ok(())
    }

    /// Replace any stale socket, record our PID and start listening.
    fn bind(&self) -> Result<UnixListener> {
        let socket_path = self.config.socket_path();
        self.config.remove_files();

        fs::write(self.config.pid_path(), std::process::id().to_string())
            .context("Failed to write PID file")?;
        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind {}", socket_path.display()))?;

        log::info!("Daemon listening on {}", socket_path.display());
        Ok(listener)
    }
}

/// Hand each incoming connection its own task until shutdown is raised.
async fn accept_connections(listener: UnixListener, tx: mpsc::Sender<Job>, shutdown: Arc<AtomicBool>) {
    let mut poll = tokio::time::interval(Duration::from_millis(SHUTDOWN_POLL_MS));

    while !shutdown.load(Ordering::Relaxed) {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let tx = tx.clone();
                    let shutdown = Arc::clone(&shutdown);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, tx, shutdown).await {
                            log::warn!("Connection error: {:#}", e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(SHUTDOWN_POLL_MS)).await;
                }
            },

            _ = poll.tick() => {}
        }
    }
}

/// Answer newline-delimited calls on one connection until the peer hangs up.
async fn serve_connection(stream: UnixStream, tx: mpsc::Sender<Job>, shutdown: Arc<AtomicBool>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let call: Call = match serde_json::from_str(line) {
            Ok(call) => call,
            Err(e) => {
                write_response(&mut writer, &Response::error(format!("Malformed request: {}", e))).await?;
                continue;
            }
        };
        let stops_daemon = matches!(call.request, Request::Shutdown);

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send((call, reply_tx))
            .await
            .map_err(|_| eyre!("Daemon is no longer accepting requests"))?;
        let response = reply_rx.await.context("Daemon dropped the request")?;
        write_response(&mut writer, &response).await?;

        // Raised only once the reply is on the wire.
        if stops_daemon {
            shutdown.store(true, Ordering::Relaxed);
            break;
        }
    }

    Ok(())
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await.context("Failed to write response")?;
    writer.flush().await?;
    Ok(())
}

/// Whether a live daemon serves `root`. Leftovers of a dead one are removed.
pub fn is_daemon_running(root: &Path) -> bool {
    let config = DaemonConfig::new(root);
    if !config.socket_path().exists() {
        return false;
    }

    match read_pid(root) {
        Some(pid) if process_alive(pid) => true,
        _ => {
            log::debug!("Removing stale daemon files under {}", root.display());
            config.remove_files();
            false
        }
    }
}

fn process_alive(pid: i32) -> bool {
    // Signal 0 only checks that the process exists.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// PID recorded by a running daemon, if any.
pub fn read_pid(root: &Path) -> Option<i32> {
    fs::read_to_string(DaemonConfig::new(root).pid_path())
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Launch `td --dir <root> daemon` detached from this terminal.
pub fn start_daemon(root: &Path) -> Result<()> {
    let exe = std::env::current_exe().context("Cannot locate the td executable")?;

    let child = Command::new(exe)
        .arg("--dir")
        .arg(root)
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to spawn daemon process")?;
    log::info!("Spawned daemon pid {} for {}", child.id(), root.display());

    std::thread::sleep(Duration::from_millis(SHUTDOWN_POLL_MS));
    Ok(())
}
