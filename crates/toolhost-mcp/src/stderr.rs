//! Server stderr draining.
//!
//! Servers log to stderr freely. The pipe must be drained or a chatty server
//! blocks on a full buffer, and the last few lines are the best explanation
//! we have when a handshake fails.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

/// Number of stderr lines retained per server.
pub const STDERR_TAIL_LINES: usize = 20;

/// Bounded buffer of the most recent stderr lines.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl StderrTail {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == STDERR_TAIL_LINES {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    /// Retained lines, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Retained lines joined for inclusion in an error message.
    pub fn render(&self) -> Option<String> {
        let lines = self.snapshot();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// Drain `stream` line by line until EOF.
///
/// Lines are decoded lossily so invalid UTF-8 never ends the reader.
pub fn spawn_stderr_reader(
    server: String,
    stream: impl AsyncRead + Unpin + Send + 'static,
    tail: StderrTail,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }
                    if buf.is_empty() {
                        continue;
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    debug!(server = %server, "stderr: {}", line);
                    tail.push(line);
                }
                Err(e) => {
                    debug!(server = %server, error = %e, "stderr reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(server = %server, "stderr reader task exiting");
    })
}
