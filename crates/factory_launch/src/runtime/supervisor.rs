//! Supervision of the single dev-server child process
//!
//! The supervisor owns zero-or-one running child at a time. Start spawns the
//! command with the resolved PATH prepend and drains its output into an event
//! channel; stop applies the graceful-then-forced escalation and only reports
//! Stopped once the exit is confirmed. All state mutation (start, stop, the
//! monitor's exit detection) serializes on one mutex.

use crate::runtime::resolver::amended_path;
use crate::runtime::terminate::terminate_tree;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Default grace period between the termination request and the force kill.
pub const DEFAULT_GRACE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on waiting for exit confirmation after a force kill.
const FORCE_WAIT: Duration = Duration::from_secs(2);

/// Bound on joining the output readers during stop.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How often the monitor polls for an unexpected exit.
const MONITOR_INTERVAL: Duration = Duration::from_millis(500);

/// ANSI color escapes are meaningless outside a terminal; strip them.
static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ANSI pattern"));

/// Supervised process lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No process has been started yet
    NotStarted,
    /// Spawn in progress
    Starting,
    /// Spawn succeeded; the service itself may still be warming up
    Running,
    /// Stop escalation in progress
    Stopping,
    /// Exit confirmed after an explicit stop
    Stopped,
    /// Spawn failed or the process exited on its own
    Failed,
}

/// Read-only view of the supervised process; the underlying handle never
/// leaves the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct StateSnapshot {
    pub state: SupervisorState,
    pub pid: Option<u32>,
    pub started_at: Option<Instant>,
}

/// Event emitted by the supervisor.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// Process spawned
    Started { pid: u32 },
    /// One line of merged stdout/stderr output, ANSI-stripped
    Line { line: String },
    /// Process exited; `unexpected` means it died without a stop request
    Exited { code: Option<i32>, unexpected: bool },
    /// The executable could not be launched
    Failed { error: String },
}

/// What to spawn and where.
#[derive(Debug, Clone)]
pub struct StartSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Directories prepended to the inherited PATH for the child
    pub path_prepend: Vec<PathBuf>,
}

/// Errors from starting a supervised process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("a supervised process is already running")]
    AlreadyRunning,

    #[error("failed to spawn process: {source}")]
    SpawnFailed {
        #[source]
        source: std::io::Error,
    },
}

struct Inner {
    state: SupervisorState,
    pid: Option<u32>,
    started_at: Option<Instant>,
    child: Option<Child>,
    readers: Vec<JoinHandle<()>>,
}

/// Owns the single supervised child process.
pub struct Supervisor {
    inner: Arc<Mutex<Inner>>,
    event_tx: mpsc::UnboundedSender<SupervisorEvent>,
    grace_timeout: Duration,
}

impl Supervisor {
    /// Create a supervisor and the receiving end of its event stream.
    pub fn new(grace_timeout: Duration) -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SupervisorState::NotStarted,
                pid: None,
                started_at: None,
                child: None,
                readers: Vec::new(),
            })),
            event_tx,
            grace_timeout,
        };
        (supervisor, event_rx)
    }

    /// Current state snapshot.
    pub async fn state(&self) -> StateSnapshot {
        let inner = self.inner.lock().await;
        StateSnapshot {
            state: inner.state,
            pid: inner.pid,
            started_at: inner.started_at,
        }
    }

    /// Spawn the command and begin streaming its output.
    ///
    /// Running is entered immediately after a successful spawn; service
    /// readiness is not verified here. A previous Stopped/Failed process is
    /// discarded and replaced by a fresh instance. Returns the child's pid
    /// when the OS reported one.
    pub async fn start(&self, spec: StartSpec) -> Result<Option<u32>, SupervisorError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SupervisorState::Starting | SupervisorState::Running | SupervisorState::Stopping => {
                return Err(SupervisorError::AlreadyRunning)
            }
            SupervisorState::NotStarted | SupervisorState::Stopped | SupervisorState::Failed => {}
        }

        inner.state = SupervisorState::Starting;
        log::info!("Starting: {} {}", spec.program, spec.args.join(" "));

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .env("PATH", amended_path(&spec.path_prepend))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so the whole tree can be signalled on stop.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                inner.state = SupervisorState::Failed;
                log::error!("Failed to spawn {}: {}", spec.program, e);
                let _ = self.event_tx.send(SupervisorEvent::Failed {
                    error: e.to_string(),
                });
                return Err(SupervisorError::SpawnFailed { source: e });
            }
        };

        // No 0 sentinel: pid 0 would address our own process group on Unix.
        let pid = child.id();
        inner.pid = pid;
        inner.started_at = Some(Instant::now());
        inner.state = SupervisorState::Running;
        if let Some(pid) = pid {
            let _ = self.event_tx.send(SupervisorEvent::Started { pid });
        }

        // Drain stdout and stderr into the same event stream.
        inner.readers.clear();
        if let Some(stdout) = child.stdout.take() {
            inner
                .readers
                .push(spawn_line_reader(stdout, self.event_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            inner
                .readers
                .push(spawn_line_reader(stderr, self.event_tx.clone()));
        }

        inner.child = Some(child);
        self.spawn_monitor();

        Ok(pid)
    }

    /// Detects a child that exits without a stop request and surfaces it as
    /// a state change instead of silently ignoring it.
    fn spawn_monitor(&self) {
        let inner_arc = Arc::clone(&self.inner);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MONITOR_INTERVAL);
            loop {
                interval.tick().await;
                let mut inner = inner_arc.lock().await;
                if inner.state != SupervisorState::Running {
                    break;
                }
                let Some(child) = inner.child.as_mut() else {
                    break;
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        log::error!("Supervised process exited unexpectedly: {}", status);
                        inner.state = SupervisorState::Failed;
                        inner.pid = None;
                        inner.child = None;
                        let _ = event_tx.send(SupervisorEvent::Exited {
                            code: status.code(),
                            unexpected: true,
                        });
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("Error polling supervised process: {}", e);
                    }
                }
            }
        });
    }

    /// Stop the supervised process: graceful tree termination, bounded wait,
    /// then force kill. Idempotent; stop-before-start, double-stop and
    /// stop-after-natural-exit are all no-ops.
    ///
    /// Returns only after the exit is confirmed (or the handle is abandoned
    /// to the kernel after a failed force kill) and the output readers have
    /// been drained, so a caller may immediately start a fresh process.
    pub async fn stop(&self) {
        let (pid, mut child, readers) = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SupervisorState::Starting | SupervisorState::Running => {}
                _ => return,
            }
            let Some(child) = inner.child.take() else {
                inner.state = SupervisorState::Stopped;
                inner.pid = None;
                return;
            };
            inner.state = SupervisorState::Stopping;
            let pid = inner.pid.take();
            let readers = std::mem::take(&mut inner.readers);
            (pid, child, readers)
        };

        log::info!("Stopping supervised process (pid {:?})", pid);
        if let Some(pid) = pid {
            if let Err(e) = terminate_tree(pid, false).await {
                log::warn!("Graceful termination request failed: {}", e);
            }
        }

        let code = match tokio::time::timeout(self.grace_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                log::info!("Process exited with {}", status);
                status.code()
            }
            Ok(Err(e)) => {
                log::error!("Error waiting for process: {}", e);
                None
            }
            Err(_) => {
                log::warn!(
                    "Process did not exit within {:?}, force killing",
                    self.grace_timeout
                );
                self.force_kill(pid, &mut child).await
            }
        };

        // Join the readers so the final lines are not lost.
        for mut handle in readers {
            if tokio::time::timeout(READER_JOIN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }

        let mut inner = self.inner.lock().await;
        inner.state = SupervisorState::Stopped;
        inner.pid = None;
        let _ = self.event_tx.send(SupervisorEvent::Exited {
            code,
            unexpected: false,
        });
        log::info!("Supervised process stopped");
    }

    /// Force-kill path. Even when everything fails the handle is released;
    /// the supervisor never stays stuck in Stopping.
    async fn force_kill(&self, pid: Option<u32>, child: &mut Child) -> Option<i32> {
        let tree_kill = match pid {
            Some(pid) => terminate_tree(pid, true).await,
            None => Err(std::io::Error::other("no pid recorded")),
        };
        if let Err(e) = tree_kill {
            log::error!("Force kill of process tree failed: {}", e);
            if let Err(e) = child.start_kill() {
                log::error!("Force kill of child failed: {}", e);
            }
        }

        match tokio::time::timeout(FORCE_WAIT, child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(e)) => {
                log::error!("Error waiting for force-killed process: {}", e);
                None
            }
            Err(_) => {
                log::error!("Process still alive after force kill; releasing handle");
                None
            }
        }
    }
}

/// Dedicated reader for one output pipe. Lives until EOF; undecodable bytes
/// are replaced rather than raised, and ANSI escapes are stripped before the
/// line is forwarded.
fn spawn_line_reader<R>(
    stream: R,
    tx: mpsc::UnboundedSender<SupervisorEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = strip_ansi(line.trim_end_matches(['\n', '\r']));
                    let _ = tx.send(SupervisorEvent::Line { line });
                }
                Err(e) => {
                    log::warn!("Output reader error: {}", e);
                    break;
                }
            }
        }
    })
}

/// Remove ANSI color-escape sequences from a line.
pub fn strip_ansi(line: &str) -> String {
    ANSI_ESCAPE.replace_all(line, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mhello\x1b[0m"), "hello");
        assert_eq!(strip_ansi("\x1b[1;32mVITE\x1b[0m ready"), "VITE ready");
    }

    #[test]
    fn test_strip_ansi_leaves_plain_text() {
        assert_eq!(strip_ansi("server listening on 3000"), "server listening on 3000");
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let (supervisor, _rx) = Supervisor::new(DEFAULT_GRACE_TIMEOUT);
        supervisor.stop().await;
        assert_eq!(supervisor.state().await.state, SupervisorState::NotStarted);
    }

    #[tokio::test]
    async fn test_spawn_failure_enters_failed() {
        let (supervisor, mut rx) = Supervisor::new(DEFAULT_GRACE_TIMEOUT);
        let spec = StartSpec {
            program: "definitely-not-an-executable".to_string(),
            args: vec![],
            working_dir: std::env::temp_dir(),
            path_prepend: vec![],
        };
        let err = supervisor.start(spec).await.unwrap_err();
        assert!(matches!(err, SupervisorError::SpawnFailed { .. }));
        assert_eq!(supervisor.state().await.state, SupervisorState::Failed);
        assert!(matches!(
            rx.recv().await,
            Some(SupervisorEvent::Failed { .. })
        ));
        // Stop after a failed spawn stays a no-op.
        supervisor.stop().await;
        assert_eq!(supervisor.state().await.state, SupervisorState::Failed);
    }
}
