use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::Notify;

use crate::log_buffer::SharedLogBuffer;
use crate::{DisplaySender, post};

/// Grace period between SIGTERM and SIGKILL in [`ProcessController::stop`].
const STOP_GRACE: Duration = Duration::from_secs(2);
/// How long output pumps may keep draining after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("a run session is already active (pid {pid})")]
    AlreadyRunning { pid: u32 },
    #[error("no run session is active")]
    NotRunning,
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process stdin not available")]
    StdinUnavailable,
    #[error("write to process stdin failed: {0}")]
    Write(#[source] std::io::Error),
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Running { pid: u32, session: u64 },
}

struct RunningProcess {
    pid: u32,
    session: u64,
    stdin: Option<ChildStdin>,
}

#[derive(Default)]
struct Inner {
    running: Option<RunningProcess>,
    sessions_started: u64,
}

/// Owner of the single long-running build/run process.
///
/// Idle -> Running only through [`start`](Self::start); Running -> Idle only
/// when the process exits. Output from both pipes is appended to the shared
/// log buffer and echoed to the display surface.
#[derive(Clone)]
pub struct ProcessController {
    /// $SHELL or "sh" fallback.
    shell_path: String,
    /// Working directory for spawned processes.
    cwd: PathBuf,
    inner: Arc<StdMutex<Inner>>,
    exit_notify: Arc<Notify>,
    log: SharedLogBuffer,
    display: DisplaySender,
}

impl ProcessController {
    pub fn new(log: SharedLogBuffer, display: DisplaySender) -> Self {
        let shell_path = std::env::var("SHELL").unwrap_or_else(|_| "sh".into());
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            shell_path,
            cwd,
            inner: Arc::new(StdMutex::new(Inner::default())),
            exit_notify: Arc::new(Notify::new()),
            log,
            display,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_shell(mut self, shell_path: impl Into<String>) -> Self {
        self.shell_path = shell_path.into();
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> ProcessState {
        match &self.lock().running {
            Some(r) => ProcessState::Running {
                pid: r.pid,
                session: r.session,
            },
            None => ProcessState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    /// Spawn `command` through the shell unless a session is already active.
    /// Returns the child's pid.
    pub fn start(&self, command: &str) -> Result<u32, ProcessError> {
        let mut inner = self.lock();
        if let Some(r) = &inner.running {
            let pid = r.pid;
            tracing::warn!(pid, "start rejected: run session already active");
            post(
                &self.display,
                format!("A run session is already active (pid {pid}). Stop it first."),
            );
            return Err(ProcessError::AlreadyRunning { pid });
        }

        let mut cmd = tokio::process::Command::new(&self.shell_path);
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.cwd)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            // New process group so stop() reaches the tool's own children
            .process_group(0);
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(source) => {
                tracing::warn!("failed to spawn `{command}`: {source}");
                post(&self.display, format!("Failed to start `{command}`: {source}"));
                return Err(ProcessError::Spawn {
                    command: command.to_string(),
                    source,
                });
            }
        };

        let pid = child.id().unwrap_or(0);
        inner.sessions_started += 1;
        let session = inner.sessions_started;
        inner.running = Some(RunningProcess {
            pid,
            session,
            stdin: child.stdin.take(),
        });
        drop(inner);

        self.log.lock().unwrap_or_else(|p| p.into_inner()).reset();
        tracing::info!(pid, session, "started `{command}`");
        post(&self.display, format!("Started `{command}` (pid {pid})"));

        self.spawn_watcher(child, session);
        Ok(pid)
    }

    /// Reap the child, give the output pumps a short window to drain, then
    /// return the controller to Idle. Pumps still blocked after the window
    /// (a detached grandchild holding the pipes) are aborted.
    fn spawn_watcher(&self, mut child: Child, session: u64) {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut out_task = tokio::spawn(pump(stdout, self.log.clone(), self.display.clone()));
        let mut err_task = tokio::spawn(pump(stderr, self.log.clone(), self.display.clone()));

        let inner = self.inner.clone();
        let exit_notify = self.exit_notify.clone();
        let display = self.display.clone();
        tokio::spawn(async move {
            let notice = match child.wait().await {
                Ok(status) => match status.code() {
                    Some(code) => format!("[process exited with code {code}]"),
                    None => "[process terminated by signal]".to_string(),
                },
                Err(e) => format!("[process wait failed: {e}]"),
            };

            let drained = tokio::time::timeout(DRAIN_GRACE, async {
                let _ = (&mut out_task).await;
                let _ = (&mut err_task).await;
            })
            .await;
            if drained.is_err() {
                tracing::debug!(session, "output pipes still open after exit; aborting pumps");
                out_task.abort();
                err_task.abort();
            }

            tracing::info!(session, "{notice}");
            post(&display, notice);
            {
                let mut inner = inner.lock().unwrap_or_else(|p| p.into_inner());
                if inner.running.as_ref().is_some_and(|r| r.session == session) {
                    inner.running = None;
                }
            }
            exit_notify.notify_waiters();
        });
    }

    /// Write `line` plus a newline to the process's stdin.
    pub async fn send_line(&self, line: &str) -> Result<(), ProcessError> {
        let (session, stdin) = {
            let mut inner = self.lock();
            match inner.running.as_mut() {
                Some(r) => (r.session, r.stdin.take()),
                None => {
                    tracing::warn!("send_line({line:?}) with no active session");
                    post(
                        &self.display,
                        format!("No active run session; `{line}` was not sent."),
                    );
                    return Err(ProcessError::NotRunning);
                }
            }
        };

        let Some(mut stdin) = stdin else {
            post(&self.display, "Run session stdin is not available.");
            return Err(ProcessError::StdinUnavailable);
        };

        let payload = format!("{line}\n");
        let result = match stdin.write_all(payload.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };

        {
            let mut inner = self.lock();
            if let Some(r) = inner.running.as_mut()
                && r.session == session
            {
                r.stdin = Some(stdin);
            }
        }

        result.map_err(|e| {
            post(&self.display, format!("Failed to write to run session: {e}"));
            ProcessError::Write(e)
        })
    }

    /// Hot reload for `flutter run`.
    pub async fn hot_reload(&self) -> Result<(), ProcessError> {
        self.send_line("r").await
    }

    /// Hot restart for `flutter run`.
    pub async fn hot_restart(&self) -> Result<(), ProcessError> {
        self.send_line("R").await
    }

    /// Kill the process group (SIGTERM -> wait -> SIGKILL). The controller
    /// goes Idle when the exit is observed, as for any other exit.
    pub async fn stop(&self) -> Result<(), ProcessError> {
        let (pid, session) = match self.state() {
            ProcessState::Running { pid, session } => (pid, session),
            ProcessState::Idle => {
                post(&self.display, "No active run session to stop.");
                return Err(ProcessError::NotRunning);
            }
        };

        tracing::info!(pid, session, "stopping run session");
        // Kill the entire process group (negative PID) so child processes die too
        let _ = tokio::process::Command::new("kill")
            .arg("--")
            .arg(format!("-{pid}"))
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        if !self.wait_session_end(session, STOP_GRACE).await {
            let _ = tokio::process::Command::new("kill")
                .args(["-9", "--", &format!("-{pid}")])
                .stderr(std::process::Stdio::null())
                .status()
                .await;
            let _ = tokio::process::Command::new("kill")
                .args(["-9", &pid.to_string()])
                .stderr(std::process::Stdio::null())
                .status()
                .await;
        }
        Ok(())
    }

    /// Wait until no session is running. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        match self.state() {
            ProcessState::Idle => true,
            ProcessState::Running { session, .. } => self.wait_session_end(session, timeout).await,
        }
    }

    async fn wait_session_end(&self, session: u64, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let ended = !matches!(
                self.state(),
                ProcessState::Running { session: s, .. } if s == session
            );
            if ended {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::select! {
                _ = self.exit_notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
    }
}

/// Forward lines from one pipe into the log buffer and the display surface.
async fn pump<R>(pipe: Option<R>, log: SharedLogBuffer, display: DisplaySender)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                {
                    let line = String::from_utf8_lossy(&buf);
                    let text = line.trim_end_matches(['\n', '\r']);
                    log.lock().unwrap_or_else(|p| p.into_inner()).append(text);
                    post(&display, text);
                }
                buf.clear();
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("output pipe read failed: {e}");
                break;
            }
        }
    }
}
