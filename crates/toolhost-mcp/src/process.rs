//! Server process lifecycle.
//!
//! A [`ProcessHandle`] owns nothing but a kill switch; the `Child` itself
//! lives in a watcher task that either observes an unexpected exit (and runs
//! the exit callback) or performs the requested shutdown. Dropping the handle
//! flips the kill switch, so a forgotten handle never leaks a process.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use toolhost_core::{McpError, ServerConfig};

use crate::path::child_env_overrides;
use crate::resolver::resolve_executable;

/// Grace period between SIGTERM and SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Invoked at most once, when the process exits without being asked to.
pub type ExitCallback = Box<dyn FnOnce(ProcessExit) + Send + 'static>;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if any (Unix only).
    pub signal: Option<i32>,
}

impl ProcessExit {
    fn from_status(status: io::Result<ExitStatus>) -> Self {
        match status {
            Ok(status) => Self {
                code: status.code(),
                signal: exit_signal(&status),
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
const fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// A freshly spawned process and its stdio pipes.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub handle: ProcessHandle,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Handle to a running server process.
pub struct ProcessHandle {
    name: String,
    pid: Option<u32>,
    kill_tx: StdMutex<Option<oneshot::Sender<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessHandle {
    /// Resolve and spawn the configured command with piped stdio.
    ///
    /// `on_exit` runs on the watcher task if the process ends on its own.
    pub fn spawn(config: &ServerConfig, on_exit: ExitCallback) -> Result<SpawnedProcess, McpError> {
        let spawn_err = |reason: String| McpError::ProcessSpawn {
            name: config.name.clone(),
            reason,
        };

        let resolved = resolve_executable(&config.command, std::env::var_os("PATH").as_deref())
            .map_err(|e| spawn_err(e.to_string()))?;
        let exe_path = resolved.resolved_path;

        debug!(
            server = %config.name,
            command = %config.command,
            resolved = %exe_path.display(),
            attempts = resolved.attempts.len(),
            "Resolved server executable"
        );

        let mut cmd = Command::new(&exe_path);
        cmd.args(&config.args)
            .envs(child_env_overrides(config, &exe_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_err(format!("{}: {e}", exe_path.display())))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
            return Err(spawn_err("stdio pipes unavailable".to_string()));
        };

        info!(server = %config.name, pid = ?pid, "Spawned MCP server process");

        let (kill_tx, kill_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_child(config.name.clone(), child, kill_rx, on_exit));

        Ok(SpawnedProcess {
            handle: Self {
                name: config.name.clone(),
                pid,
                kill_tx: StdMutex::new(Some(kill_tx)),
                watcher: Mutex::new(Some(watcher)),
            },
            stdin,
            stdout,
            stderr,
        })
    }

    /// OS process id, if known.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has already been reaped.
    pub async fn has_exited(&self) -> bool {
        self.watcher
            .lock()
            .await
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Stop the process: SIGTERM, then SIGKILL after [`TERMINATE_GRACE`].
    ///
    /// Returns once the process has been reaped. Safe to call repeatedly and
    /// after the process already exited; the exit callback does not fire.
    pub async fn terminate(&self) {
        let kill_tx = self
            .kill_tx
            .lock()
            .map_or(None, |mut guard| guard.take());
        if let Some(tx) = kill_tx {
            let _ = tx.send(());
        }

        let watcher = self.watcher.lock().await.take();
        if let Some(watcher) = watcher {
            if let Err(e) = watcher.await {
                warn!(server = %self.name, error = %e, "Process watcher task failed");
            }
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

async fn watch_child(
    name: String,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    on_exit: ExitCallback,
) {
    tokio::select! {
        biased;
        // Fires on an explicit terminate and when the handle is dropped.
        _ = kill_rx => {
            match shutdown_child(&mut child).await {
                Ok(status) => debug!(server = %name, %status, "Server process stopped"),
                Err(e) => warn!(server = %name, error = %e, "Failed to stop server process"),
            }
        }
        status = child.wait() => {
            let exit = ProcessExit::from_status(status);
            warn!(
                server = %name,
                code = ?exit.code,
                signal = ?exit.signal,
                "Server process exited unexpectedly"
            );
            on_exit(exit);
        }
    }
}

/// Graceful shutdown with SIGTERM → SIGKILL escalation.
async fn shutdown_child(child: &mut Child) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
                Ok(()) => {
                    if let Ok(result) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                        return result;
                    }
                }
                // Already gone, just reap it
                Err(nix::errno::Errno::ESRCH) => return child.wait().await,
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }

    child.kill().await?;
    child.wait().await
}
