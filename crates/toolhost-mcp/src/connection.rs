//! A running server: its process, transport tasks and correlator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::correlator::{RequestCorrelator, spawn_dispatcher};
use crate::launcher::LaunchedServer;
use crate::process::ProcessHandle;
use crate::stderr::{StderrTail, spawn_stderr_reader};
use crate::transport::{FrameWriter, spawn_read_loop};

/// Inbound frames buffered between the read loop and the dispatcher.
const INBOUND_CAPACITY: usize = 64;

/// Per-server runtime context.
pub struct ServerConnection {
    name: String,
    instance: u64,
    writer: Arc<FrameWriter>,
    correlator: Arc<RequestCorrelator>,
    process: Option<ProcessHandle>,
    stderr: StderrTail,
    started_at: DateTime<Utc>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerConnection {
    /// Attach transport tasks to a launched server.
    ///
    /// `on_closed` runs once if stdout reaches EOF before [`Self::shutdown`].
    pub fn attach(
        name: &str,
        instance: u64,
        launched: LaunchedServer,
        on_closed: impl FnOnce() + Send + 'static,
    ) -> Self {
        let LaunchedServer { pipes, process } = launched;

        let writer = Arc::new(FrameWriter::new(name, pipes.stdin));
        let correlator = Arc::new(RequestCorrelator::new(name, Arc::clone(&writer)));
        let stderr = StderrTail::new();

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let mut tasks = vec![
            spawn_read_loop(name.to_string(), pipes.stdout, tx),
            spawn_dispatcher(Arc::clone(&correlator), rx, on_closed),
        ];
        if let Some(stream) = pipes.stderr {
            tasks.push(spawn_stderr_reader(name.to_string(), stream, stderr.clone()));
        }

        Self {
            name: name.to_string(),
            instance,
            writer,
            correlator,
            process,
            stderr,
            started_at: Utc::now(),
            tasks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distinguishes successive runs of the same server name.
    pub const fn instance(&self) -> u64 {
        self.instance
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    pub const fn stderr(&self) -> &StderrTail {
        &self.stderr
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Fail pending requests, close stdin and terminate the process.
    ///
    /// Pending callers are released before the process is signalled, so
    /// they never wait on the termination grace period.
    pub async fn shutdown(&self) {
        self.correlator.fail_all();
        self.writer.close().await;
        if let Some(process) = &self.process {
            process.terminate().await;
        }
        for task in &self.tasks {
            task.abort();
        }
        debug!(server = %self.name, instance = self.instance, "Server connection closed");
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("name", &self.name)
            .field("instance", &self.instance)
            .field("process", &self.process)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}
