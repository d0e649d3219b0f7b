//! Stdio transport: framed writes to stdin, framed reads from stdout.

use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use toolhost_core::McpError;

use crate::framing::LineFramer;

/// Boxed stdin half of a server connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
/// Boxed stdout/stderr half of a server connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

const READ_CHUNK: usize = 8 * 1024;

/// Something the read loop observed on a server's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One complete, parseable JSON message.
    Message(Value),
    /// A complete line that was not valid JSON. The loop keeps going.
    Malformed { raw: String, reason: String },
    /// stdout reached EOF or failed. Always the last event.
    Closed,
}

/// How long [`FrameWriter::close`] lets queued frames drain before stdin is
/// dropped.
pub const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// One queued line, with an optional acknowledgement once it is written.
struct Frame {
    line: Vec<u8>,
    written: Option<oneshot::Sender<Result<(), String>>>,
}

/// Queued writer for one server's stdin.
///
/// Frames go through an unbounded queue to a dedicated writer task, which
/// writes each as compact JSON plus `\n`. Concurrent senders never
/// interleave partial lines, and a server that stops reading stalls only
/// the writer task, never a lock that callers or [`Self::close`] wait on.
pub struct FrameWriter {
    server: String,
    queue: StdMutex<Option<mpsc::UnboundedSender<Frame>>>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl FrameWriter {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn new(server: impl Into<String>, stdin: BoxedWriter) -> Self {
        let server = server.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(server.clone(), stdin, rx));
        Self {
            server,
            queue: StdMutex::new(Some(tx)),
            task: StdMutex::new(Some(task)),
        }
    }

    /// Write one framed message and wait until it is flushed.
    ///
    /// Waits as long as the server's stdin is blocked; callers bound it
    /// with their own deadline.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), McpError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(message, Some(tx))?;
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(self.transport_err(reason)),
            Err(_) => Err(self.transport_err("stdin closed")),
        }
    }

    /// Queue one framed message without waiting for the write.
    pub fn post<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), McpError> {
        self.enqueue(message, None)
    }

    fn enqueue<T: Serialize + ?Sized>(
        &self,
        message: &T,
        written: Option<oneshot::Sender<Result<(), String>>>,
    ) -> Result<(), McpError> {
        let mut line = serde_json::to_vec(message).map_err(|e| self.transport_err(e))?;
        line.push(b'\n');

        let queue = lock(&self.queue);
        let sender = queue
            .as_ref()
            .ok_or_else(|| self.transport_err("stdin closed"))?;
        sender
            .send(Frame { line, written })
            .map_err(|_| self.transport_err("stdin closed"))
    }

    /// Close stdin. Later sends fail with a transport error.
    ///
    /// Frames already queued get [`CLOSE_GRACE`] to drain; after that the
    /// writer task is aborted and stdin dropped, even mid-write.
    pub async fn close(&self) {
        drop(lock(&self.queue).take());
        let task = lock(&self.task).take();
        let Some(mut task) = task else {
            return;
        };
        if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
            debug!(server = %self.server, "Server stdin still blocked, dropping it");
            task.abort();
        }
    }

    fn transport_err(&self, reason: impl ToString) -> McpError {
        McpError::Transport {
            server: self.server.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        let task = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drain the queue into stdin until the queue closes or a write fails.
async fn write_loop(
    server: String,
    mut stdin: BoxedWriter,
    mut queue: mpsc::UnboundedReceiver<Frame>,
) {
    while let Some(frame) = queue.recv().await {
        let result = write_frame(&mut stdin, &frame.line).await;
        let failed = match &result {
            Ok(()) => {
                trace!(server = %server, bytes = frame.line.len(), "Frame written");
                false
            }
            Err(e) => {
                debug!(server = %server, error = %e, "Write to server stdin failed");
                true
            }
        };
        if let Some(written) = frame.written {
            let _ = written.send(result.map_err(|e| e.to_string()));
        }
        if failed {
            break;
        }
    }

    if let Err(e) = stdin.shutdown().await {
        debug!(server = %server, error = %e, "Error closing server stdin");
    }
}

async fn write_frame(stdin: &mut BoxedWriter, line: &[u8]) -> std::io::Result<()> {
    stdin.write_all(line).await?;
    stdin.flush().await
}

/// Spawn the read loop for one server's stdout.
///
/// Frames are parsed and forwarded in arrival order. The loop ends after
/// sending [`TransportEvent::Closed`], or early if the receiver is gone.
pub fn spawn_read_loop(
    server: String,
    mut stdout: BoxedReader,
    events: mpsc::Sender<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut framer = LineFramer::new();
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            let n = match stdout.read(&mut chunk).await {
                Ok(0) => {
                    debug!(server = %server, "Server stdout closed");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(server = %server, error = %e, "Error reading server stdout");
                    break;
                }
            };

            framer.push(&chunk[..n]);
            while let Some(frame) = framer.next_frame() {
                let event = match serde_json::from_slice::<Value>(&frame) {
                    Ok(message) => TransportEvent::Message(message),
                    Err(e) => TransportEvent::Malformed {
                        raw: String::from_utf8_lossy(&frame).into_owned(),
                        reason: e.to_string(),
                    },
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
        }

        if !framer.pending().is_empty() {
            debug!(
                server = %server,
                bytes = framer.pending().len(),
                "Discarding unterminated data at end of stream"
            );
        }
        let _ = events.send(TransportEvent::Closed).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use tokio::io::AsyncBufReadExt;

    #[tokio::test]
    async fn test_read_loop_dispatches_batched_and_split_messages() {
        let (mut server_side, client_side) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(16);
        let task = spawn_read_loop("fs".to_string(), Box::new(client_side), tx);

        server_side
            .write_all(b"{\"id\":1}\n{\"id\":2}\n{\"id\":")
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(TransportEvent::Message(json!({"id": 1}))));
        assert_eq!(rx.recv().await, Some(TransportEvent::Message(json!({"id": 2}))));

        server_side.write_all(b"3}\n").await.unwrap();
        assert_eq!(rx.recv().await, Some(TransportEvent::Message(json!({"id": 3}))));

        drop(server_side);
        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_stop_loop() {
        let (mut server_side, client_side) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(16);
        spawn_read_loop("fs".to_string(), Box::new(client_side), tx);

        server_side
            .write_all(b"not json\n{\"ok\":true}\n")
            .await
            .unwrap();

        match rx.recv().await {
            Some(TransportEvent::Malformed { raw, .. }) => assert_eq!(raw, "not json"),
            other => panic!("expected malformed frame, got {other:?}"),
        }
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Message(json!({"ok": true})))
        );
    }

    #[tokio::test]
    async fn test_writer_frames_each_message() {
        let (client_side, server_side) = tokio::io::duplex(1024);
        let writer = FrameWriter::new("fs", Box::new(client_side));

        writer.send(&json!({"a": 1})).await.unwrap();
        writer.send(&json!({"b": [1, 2]})).await.unwrap();

        let mut lines = tokio::io::BufReader::new(server_side).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), r#"{"a":1}"#);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), r#"{"b":[1,2]}"#);
    }

    #[tokio::test]
    async fn test_send_after_close_is_transport_error() {
        let (client_side, _server_side) = tokio::io::duplex(64);
        let writer = FrameWriter::new("fs", Box::new(client_side));
        writer.close().await;

        let err = writer.send(&json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Transport { ref server, .. } if server == "fs"));
        assert!(writer.post(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_close_does_not_wait_on_blocked_stdin() {
        // The reading side is kept open but never drained.
        let (client_side, _server_side) = tokio::io::duplex(16);
        let writer = Arc::new(FrameWriter::new("stuck", Box::new(client_side)));

        let blocked = {
            let writer = Arc::clone(&writer);
            tokio::spawn(async move { writer.send(&json!({"blob": "x".repeat(256)})).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        tokio::time::timeout(CLOSE_GRACE * 4, writer.close())
            .await
            .expect("close should not wait for the stalled write");
        let err = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("blocked sender should be released")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, McpError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_posted_frames_keep_queue_order() {
        let (client_side, server_side) = tokio::io::duplex(1024);
        let writer = FrameWriter::new("fs", Box::new(client_side));

        writer.post(&json!({"n": 1})).unwrap();
        writer.send(&json!({"n": 2})).await.unwrap();

        let mut lines = tokio::io::BufReader::new(server_side).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), r#"{"n":1}"#);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), r#"{"n":2}"#);
    }
}
