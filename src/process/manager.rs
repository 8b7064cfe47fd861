//! Supervised background processes: spawn, capture, watch, kill, subscribe.
//!
//! Every started command gets a [`Process`] record owning two bounded log
//! rings and a list of live subscribers. Two capture workers read the child's
//! pipes line by line; a completion watcher reaps the child, records the
//! terminal state under the process lock, and fires the `done` latch exactly
//! once. Subscribers receive the buffered history first, then live lines,
//! and their channel closes shortly after the process terminates.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{Error, Result};
use super::log_buffer::{LogBuffer, LogEntry, LogStream};

/// Lines retained per stream before the oldest are evicted.
const LOG_BUFFER_CAPACITY: usize = 10_000;

/// Read buffer for the line scanners, sized for long lines.
const LINE_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Per-subscriber channel capacity; a full subscriber misses lines instead
/// of stalling the capture workers.
const SUBSCRIBER_CAPACITY: usize = 100;

/// Delay between child exit and subscriber close, letting the capture
/// workers flush lines they have already read.
const FLUSH_GRACE: Duration = Duration::from_millis(100);

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Completed,
    Failed,
    Killed,
}

impl ProcessStatus {
    /// Terminal states are sticky; only `Running` can transition.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Killed => write!(f, "killed"),
        }
    }
}

/// Mutable lifecycle fields, written once by the completion watcher.
#[derive(Debug)]
struct ProcessState {
    status: ProcessStatus,
    end_time: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
}

/// A supervised background process.
///
/// Registered before `start` returns and never removed; terminal processes
/// stay queryable until the server restarts.
#[derive(Debug)]
pub struct Process {
    id: String,
    pid: u32,
    command: String,
    cwd: Option<String>,
    start_time: DateTime<Utc>,
    state: RwLock<ProcessState>,
    stdout: LogBuffer,
    stderr: LogBuffer,
    subscribers: RwLock<Vec<mpsc::Sender<LogEntry>>>,
    done: CancellationToken,
    kill_signal: Notify,
}

impl Process {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    #[must_use]
    pub fn status(&self) -> ProcessStatus {
        self.state.read().unwrap().status
    }

    /// Set once the process reaches a terminal state.
    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().unwrap().end_time
    }

    /// Set once the process reaches a terminal state.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.state.read().unwrap().exit_code
    }

    /// Ordered copy of the retained stdout lines.
    #[must_use]
    pub fn stdout_snapshot(&self) -> Vec<LogEntry> {
        self.stdout.snapshot()
    }

    /// Ordered copy of the retained stderr lines.
    #[must_use]
    pub fn stderr_snapshot(&self) -> Vec<LogEntry> {
        self.stderr.snapshot()
    }

    /// Completes once the watcher has recorded a terminal state.
    ///
    /// `end_time` and `exit_code` are visible before this resolves.
    pub async fn wait(&self) {
        self.done.cancelled().await;
    }

    fn buffer(&self, stream: LogStream) -> &LogBuffer {
        match stream {
            LogStream::Stdout => &self.stdout,
            LogStream::Stderr => &self.stderr,
        }
    }
}

/// Manages supervised background processes.
///
/// The `id -> Process` map only grows: terminal processes are kept in memory
/// so their status and logs remain queryable.
#[derive(Debug, Default)]
pub struct ProcessManager {
    processes: RwLock<HashMap<String, Arc<Process>>>,
}

impl ProcessManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new background process.
    ///
    /// The command runs under `sh -c`, so shell features (pipes, redirection,
    /// globbing) work. The child inherits the server's environment, with
    /// `env` entries overriding on collision, and starts in `cwd` when given.
    /// The record is registered before this returns, with status `Running`.
    pub fn start(
        &self,
        command: &str,
        cwd: Option<&str>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<Arc<Process>> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        if let Some(overrides) = env {
            cmd.envs(overrides);
        }

        let mut child = cmd.spawn().map_err(|e| {
            warn!(%command, error = %e, "failed to spawn command");
            Error::Spawn(e.to_string())
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("failed to create stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Spawn("failed to create stderr pipe".to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::Spawn("child exited before a pid was recorded".to_string()))?;

        let process = Arc::new(Process {
            id: Uuid::new_v4().to_string(),
            pid,
            command: command.to_string(),
            cwd: cwd.map(str::to_string),
            start_time: Utc::now(),
            state: RwLock::new(ProcessState {
                status: ProcessStatus::Running,
                end_time: None,
                exit_code: None,
            }),
            stdout: LogBuffer::new(LOG_BUFFER_CAPACITY),
            stderr: LogBuffer::new(LOG_BUFFER_CAPACITY),
            subscribers: RwLock::new(Vec::new()),
            done: CancellationToken::new(),
            kill_signal: Notify::new(),
        });

        self.processes
            .write()
            .unwrap()
            .insert(process.id.clone(), process.clone());

        tokio::spawn(capture_output(process.clone(), stdout, LogStream::Stdout));
        tokio::spawn(capture_output(process.clone(), stderr, LogStream::Stderr));
        tokio::spawn(wait_for_completion(process.clone(), child));

        debug!(id = %process.id, pid, %command, "background process started");
        Ok(process)
    }

    /// Look up a process by id.
    pub fn get(&self, id: &str) -> Result<Arc<Process>> {
        self.processes
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// All known processes, in no particular order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Process>> {
        self.processes.read().unwrap().values().cloned().collect()
    }

    /// Deliver an unconditional termination signal to a running process.
    ///
    /// The status change is recorded by the completion watcher once the
    /// child is reaped, not here.
    pub fn kill(&self, id: &str) -> Result<()> {
        let process = self.get(id)?;
        let status = process.status();
        if status.is_terminal() {
            return Err(Error::NotRunning(status));
        }
        process.kill_signal.notify_one();
        Ok(())
    }

    /// Subscribe to a process's log lines.
    ///
    /// The receiver first gets the buffered history (stdout then stderr),
    /// then live lines as they are captured. Live delivery is lossy: lines
    /// are skipped for this subscriber while its channel is full. The
    /// channel closes shortly after the process terminates.
    pub fn subscribe(&self, id: &str) -> Result<mpsc::Receiver<LogEntry>> {
        let process = self.get(id)?;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        process.subscribers.write().unwrap().push(tx.clone());

        let history = process.clone();
        let history_tx = tx.clone();
        tokio::spawn(async move {
            let entries = history
                .stdout
                .snapshot()
                .into_iter()
                .chain(history.stderr.snapshot());
            for entry in entries {
                if history_tx.send(entry).await.is_err() {
                    break; // consumer went away
                }
            }
        });

        tokio::spawn(async move {
            process.done.cancelled().await;
            tokio::time::sleep(FLUSH_GRACE).await;
            process
                .subscribers
                .write()
                .unwrap()
                .retain(|sender| !sender.same_channel(&tx));
        });

        Ok(rx)
    }
}

/// Read one of the child's pipes line by line into the matching ring,
/// fanning each line out to the registered subscribers.
async fn capture_output<R>(process: Arc<Process>, pipe: R, stream: LogStream)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::with_capacity(LINE_BUFFER_CAPACITY, pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let entry = LogEntry::new(stream, line);
                process.buffer(stream).append(entry.clone());

                let subscribers = process.subscribers.read().unwrap();
                for subscriber in subscribers.iter() {
                    // A full subscriber misses this line.
                    let _ = subscriber.try_send(entry.clone());
                }
            }
            Ok(None) => break,
            Err(error) => {
                warn!(id = %process.id, %stream, %error, "capture worker read failed");
                break;
            }
        }
    }
}

/// Reap the child, record its terminal state, and fire the done latch.
///
/// A kill request is observed here: the watcher owns the child handle, so
/// signal delivery and reaping stay in one place.
async fn wait_for_completion(process: Arc<Process>, mut child: Child) {
    let wait_result = tokio::select! {
        status = child.wait() => status,
        _ = process.kill_signal.notified() => {
            if let Err(error) = child.start_kill() {
                warn!(id = %process.id, %error, "failed to deliver kill signal");
            }
            child.wait().await
        }
    };

    let (status, exit_code) = {
        let mut state = process.state.write().unwrap();
        state.end_time = Some(Utc::now());
        match wait_result {
            Ok(exit) => {
                state.exit_code = Some(exit.code().unwrap_or(-1));
                state.status = if exit.success() {
                    ProcessStatus::Completed
                } else if exit.code().is_none() {
                    // No exit code means the child died from a signal.
                    ProcessStatus::Killed
                } else {
                    ProcessStatus::Failed
                };
            }
            Err(error) => {
                warn!(id = %process.id, %error, "waiting on child failed");
                state.exit_code = Some(-1);
                state.status = ProcessStatus::Failed;
            }
        }
        (state.status, state.exit_code)
    };

    debug!(id = %process.id, %status, ?exit_code, "process reached terminal state");
    process.done.cancel();
}
