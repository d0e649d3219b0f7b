//! Request/response correlation for one server.
//!
//! Each outgoing request gets a fresh id and a oneshot waiter in the pending
//! table. The dispatcher task matches inbound responses by id and completes
//! the waiter; timeouts and shutdown remove entries so nothing waits forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use toolhost_core::McpError;

use crate::protocol::{Inbound, JsonRpcNotification, JsonRpcRequest, METHOD_PING, error_codes};
use crate::transport::{FrameWriter, TransportEvent};

type Waiter = oneshot::Sender<Result<Value, McpError>>;
type WaiterRx = oneshot::Receiver<Result<Value, McpError>>;

struct PendingRequest {
    method: String,
    sent_at: Instant,
    waiter: Waiter,
}

/// In-flight request tracking for a single server.
pub struct RequestCorrelator {
    server: String,
    writer: Arc<FrameWriter>,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    malformed: AtomicU64,
}

impl RequestCorrelator {
    pub fn new(server: impl Into<String>, writer: Arc<FrameWriter>) -> Self {
        Self {
            server: server.into(),
            writer,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            malformed: AtomicU64::new(0),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Send a request and wait for its response.
    ///
    /// `timeout` covers both the write to stdin and the wait for the answer,
    /// so a server that stops reading still yields `RequestTimedOut`. On
    /// timeout the pending entry is removed and a late response is ignored.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        let (id, mut rx) = self.register(method)?;
        let _guard = PendingGuard { correlator: self, id };

        debug!(server = %self.server, %method, id, "Sending request");
        let request = JsonRpcRequest::new(id, method, params.as_ref());
        let exchange = async {
            tokio::select! {
                sent = self.writer.send(&request) => sent?,
                // Answered or failed before the write was acknowledged.
                answer = &mut rx => return self.settle(answer),
            }
            self.settle((&mut rx).await)
        };

        if let Ok(result) = tokio::time::timeout(timeout, exchange).await {
            result
        } else {
            let timeout_ms = millis(timeout);
            warn!(server = %self.server, %method, id, timeout_ms, "Request timed out");
            Err(McpError::RequestTimedOut {
                server: self.server.clone(),
                method: method.to_string(),
                timeout_ms,
            })
        }
    }

    fn settle(
        &self,
        answer: Result<Result<Value, McpError>, oneshot::error::RecvError>,
    ) -> Result<Value, McpError> {
        // Waiter dropped without an answer: the table was torn down.
        answer.unwrap_or_else(|_| Err(McpError::ServerStopped(self.server.clone())))
    }

    /// Queue a notification. No response is expected and the write is not
    /// awaited.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::ServerStopped(self.server.clone()));
        }
        debug!(server = %self.server, %method, "Sending notification");
        self.writer
            .post(&JsonRpcNotification::new(method, params.as_ref()))
    }

    fn register(&self, method: &str) -> Result<(u64, WaiterRx), McpError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock_pending();
        // Checked under the lock so `fail_all` cannot miss this entry.
        if self.is_closed() {
            return Err(McpError::ServerStopped(self.server.clone()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                sent_at: Instant::now(),
                waiter: tx,
            },
        );
        Ok((id, rx))
    }

    /// Route one inbound message. Never waits on the server's stdin.
    pub fn dispatch(&self, message: Value) {
        match Inbound::classify(message) {
            Inbound::Response { id, outcome } => {
                let result = outcome.map_err(|payload| McpError::ServerReportedError {
                    server: self.server.clone(),
                    payload,
                });
                self.complete(id, result);
            }
            Inbound::EmptyResponse { id } => {
                let err = McpError::InvalidResponse {
                    server: self.server.clone(),
                    reason: format!("response {id} has neither result nor error"),
                };
                self.complete(id, Err(err));
            }
            Inbound::Request { id, method, .. } => self.answer_server_request(id, &method),
            Inbound::Notification { method } => {
                debug!(server = %self.server, %method, "Ignoring server notification");
            }
            Inbound::Unrecognized => {
                warn!(server = %self.server, "Ignoring message that is not JSON-RPC");
            }
        }
    }

    fn complete(&self, id: u64, result: Result<Value, McpError>) {
        let entry = self.lock_pending().remove(&id);
        let Some(entry) = entry else {
            debug!(server = %self.server, id, "Dropping response with unknown or expired id");
            return;
        };

        trace!(
            server = %self.server,
            method = %entry.method,
            id,
            elapsed_ms = millis(entry.sent_at.elapsed()),
            ok = result.is_ok(),
            "Response received"
        );
        // The caller may have given up in the meantime.
        let _ = entry.waiter.send(result);
    }

    fn answer_server_request(&self, id: Value, method: &str) {
        let reply = if method == METHOD_PING {
            json!({"jsonrpc": "2.0", "id": id, "result": {}})
        } else {
            debug!(server = %self.server, %method, "Rejecting unsupported server request");
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": error_codes::METHOD_NOT_FOUND,
                    "message": format!("Method not found: {method}"),
                },
            })
        };
        if let Err(e) = self.writer.post(&reply) {
            warn!(server = %self.server, %method, error = %e, "Failed to answer server request");
        }
    }

    /// Record a line that could not be parsed. The stream stays usable.
    pub fn report_malformed(&self, raw: String, reason: String) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        let preview = truncate(&raw, 200).to_string();
        let err = McpError::MalformedMessage {
            server: self.server.clone(),
            raw,
            reason,
        };
        warn!(server = %self.server, raw = %preview, "{err}");
    }

    /// Number of malformed lines seen so far.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Fail every pending request with `ServerStopped` and refuse new ones.
    pub fn fail_all(&self) {
        let drained: Vec<(u64, PendingRequest)> = {
            let mut pending = self.lock_pending();
            self.closed.store(true, Ordering::SeqCst);
            pending.drain().collect()
        };

        if !drained.is_empty() {
            debug!(server = %self.server, count = drained.len(), "Failing pending requests");
        }
        for (_, entry) in drained {
            let _ = entry
                .waiter
                .send(Err(McpError::ServerStopped(self.server.clone())));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingRequest>> {
        // A panic while holding this lock leaves the map itself consistent.
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn forget(&self, id: u64) {
        self.lock_pending().remove(&id);
    }
}

impl std::fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("server", &self.server)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Removes a pending entry when its caller finishes or is cancelled.
struct PendingGuard<'a> {
    correlator: &'a RequestCorrelator,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.forget(self.id);
    }
}

/// Consume transport events for one server until its stream closes.
///
/// Messages are dispatched one at a time, in arrival order. When the stream
/// closes, pending requests are failed and `on_closed` runs.
pub fn spawn_dispatcher(
    correlator: Arc<RequestCorrelator>,
    mut events: mpsc::Receiver<TransportEvent>,
    on_closed: impl FnOnce() + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Message(message) => correlator.dispatch(message),
                TransportEvent::Malformed { raw, reason } => {
                    correlator.report_malformed(raw, reason);
                }
                TransportEvent::Closed => break,
            }
        }

        let already_closed = correlator.is_closed();
        correlator.fail_all();
        if !already_closed {
            on_closed();
        }
    })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
