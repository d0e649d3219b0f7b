//! How a configured server is turned into a set of stdio pipes.
//!
//! The manager only needs pipes and, optionally, a process to terminate.
//! [`ProcessLauncher`] spawns real subprocesses; tests substitute an
//! in-memory launcher.

use async_trait::async_trait;

use toolhost_core::{McpError, ServerConfig};

use crate::process::{ExitCallback, ProcessHandle};
use crate::transport::{BoxedReader, BoxedWriter};

/// The three stdio streams of a server, from the manager's side.
pub struct ServerPipes {
    /// Written by us, read by the server.
    pub stdin: BoxedWriter,
    /// Written by the server, read by us.
    pub stdout: BoxedReader,
    pub stderr: Option<BoxedReader>,
}

/// A started server.
pub struct LaunchedServer {
    pub pipes: ServerPipes,
    /// Owning process, if there is one to terminate on stop.
    pub process: Option<ProcessHandle>,
}

/// Starts servers for the manager.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    /// Start `config`. `on_exit` must be invoked if the server ends on its
    /// own; it must not be invoked after a requested stop.
    async fn launch(
        &self,
        config: &ServerConfig,
        on_exit: ExitCallback,
    ) -> Result<LaunchedServer, McpError>;
}

/// Launches servers as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl ServerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        config: &ServerConfig,
        on_exit: ExitCallback,
    ) -> Result<LaunchedServer, McpError> {
        let spawned = ProcessHandle::spawn(config, on_exit)?;
        Ok(LaunchedServer {
            pipes: ServerPipes {
                stdin: Box::new(spawned.stdin),
                stdout: Box::new(spawned.stdout),
                stderr: Some(Box::new(spawned.stderr)),
            },
            process: Some(spawned.handle),
        })
    }
}
