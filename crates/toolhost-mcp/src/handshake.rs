//! MCP `initialize` handshake.

use std::fmt;

use serde_json::json;
use tracing::{debug, info};

use toolhost_core::{McpError, McpSettings};

use crate::correlator::RequestCorrelator;
use crate::protocol::{InitializeResult, METHOD_INITIALIZE, METHOD_INITIALIZED};
use crate::stderr::StderrTail;

/// Handshake progress. `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Spawned,
    InitializeSent,
    InitializedAckSent,
    Ready,
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spawned => "spawned",
            Self::InitializeSent => "initialize_sent",
            Self::InitializedAckSent => "initialized_ack_sent",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Drives one freshly spawned server to [`HandshakeState::Ready`].
///
/// Any failure moves the coordinator to [`HandshakeState::Failed`] and is
/// reported as `ServerInitializationFailed`, with the server's recent stderr
/// appended to the cause when available. No retry is attempted.
pub struct HandshakeCoordinator<'a> {
    correlator: &'a RequestCorrelator,
    settings: &'a McpSettings,
    stderr: Option<&'a StderrTail>,
    state: HandshakeState,
}

impl<'a> HandshakeCoordinator<'a> {
    pub const fn new(correlator: &'a RequestCorrelator, settings: &'a McpSettings) -> Self {
        Self {
            correlator,
            settings,
            stderr: None,
            state: HandshakeState::Spawned,
        }
    }

    #[must_use]
    pub const fn with_stderr(mut self, tail: &'a StderrTail) -> Self {
        self.stderr = Some(tail);
        self
    }

    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run `initialize` then `notifications/initialized`.
    pub async fn run(&mut self) -> Result<InitializeResult, McpError> {
        match self.exchange().await {
            Ok(result) => {
                self.transition(HandshakeState::Ready);
                Ok(result)
            }
            Err(e) => {
                self.transition(HandshakeState::Failed);
                Err(self.initialization_failed(&e))
            }
        }
    }

    async fn exchange(&mut self) -> Result<InitializeResult, McpError> {
        let params = json!({
            "protocolVersion": self.settings.protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": self.settings.client_name,
                "version": self.settings.client_version,
            },
        });

        self.transition(HandshakeState::InitializeSent);
        let raw = self
            .correlator
            .call(METHOD_INITIALIZE, Some(params), self.settings.handshake_timeout)
            .await?;

        let result: InitializeResult =
            serde_json::from_value(raw).map_err(|e| McpError::InvalidResponse {
                server: self.correlator.server().to_string(),
                reason: format!("invalid initialize result: {e}"),
            })?;

        self.correlator.notify(METHOD_INITIALIZED, None)?;
        self.transition(HandshakeState::InitializedAckSent);

        let server_name = result.server_info.as_ref().map(|info| info.name.as_str());
        info!(
            server = %self.correlator.server(),
            server_name = ?server_name,
            protocol = ?result.protocol_version,
            "MCP handshake completed"
        );
        Ok(result)
    }

    fn transition(&mut self, next: HandshakeState) {
        debug!(
            server = %self.correlator.server(),
            from = %self.state,
            to = %next,
            "Handshake state change"
        );
        self.state = next;
    }

    fn initialization_failed(&self, err: &McpError) -> McpError {
        let mut cause = err.to_string();
        if let Some(tail) = self.stderr.and_then(StderrTail::render) {
            cause.push_str("\nstderr:\n");
            cause.push_str(&tail);
        }
        McpError::ServerInitializationFailed {
            name: self.correlator.server().to_string(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::mpsc;

    use crate::correlator::spawn_dispatcher;
    use crate::transport::{FrameWriter, spawn_read_loop};

    /// Wire a correlator to an in-memory peer and return the peer's halves.
    fn connect(
        name: &str,
    ) -> (
        Arc<RequestCorrelator>,
        tokio::io::Lines<BufReader<tokio::io::DuplexStream>>,
        tokio::io::DuplexStream,
    ) {
        let (client_in, server_in) = tokio::io::duplex(4096);
        let (server_out, client_out) = tokio::io::duplex(4096);

        let writer = Arc::new(FrameWriter::new(name, Box::new(client_in)));
        let correlator = Arc::new(RequestCorrelator::new(name, writer));
        let (tx, rx) = mpsc::channel(16);
        spawn_read_loop(name.to_string(), Box::new(client_out), tx);
        spawn_dispatcher(Arc::clone(&correlator), rx, || {});

        (correlator, BufReader::new(server_in).lines(), server_out)
    }

    #[tokio::test]
    async fn test_handshake_reaches_ready() {
        let (correlator, mut requests, mut replies) = connect("fs");
        let settings = McpSettings::default();

        let server = tokio::spawn(async move {
            let init: Value =
                serde_json::from_str(&requests.next_line().await.unwrap().unwrap()).unwrap();
            assert_eq!(init["method"], "initialize");
            assert_eq!(init["params"]["protocolVersion"], "2024-11-05");
            assert_eq!(init["params"]["clientInfo"]["name"], "toolhost");

            let reply = json!({
                "jsonrpc": "2.0",
                "id": init["id"],
                "result": {"protocolVersion": "2024-11-05", "serverInfo": {"name": "fake-fs"}}
            });
            replies
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .unwrap();

            let ack: Value =
                serde_json::from_str(&requests.next_line().await.unwrap().unwrap()).unwrap();
            assert_eq!(ack["method"], "notifications/initialized");
            assert!(ack.get("id").is_none());
            replies
        });

        let mut handshake = HandshakeCoordinator::new(&correlator, &settings);
        let result = handshake.run().await.unwrap();
        assert_eq!(handshake.state(), HandshakeState::Ready);
        assert_eq!(result.server_info.unwrap().name, "fake-fs");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_server_fails_with_stderr_tail() {
        let (correlator, _requests, _replies) = connect("mute");
        let settings = McpSettings::default().with_handshake_timeout(Duration::from_millis(30));
        let tail = StderrTail::new();

        let mut handshake = HandshakeCoordinator::new(&correlator, &settings).with_stderr(&tail);
        let err = handshake.run().await.unwrap_err();

        assert_eq!(handshake.state(), HandshakeState::Failed);
        match err {
            McpError::ServerInitializationFailed { name, cause } => {
                assert_eq!(name, "mute");
                assert!(cause.contains("timed out"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_reply_fails_handshake() {
        let (correlator, mut requests, mut replies) = connect("broken");
        let settings = McpSettings::default();

        tokio::spawn(async move {
            let init: Value =
                serde_json::from_str(&requests.next_line().await.unwrap().unwrap()).unwrap();
            let reply = json!({
                "jsonrpc": "2.0",
                "id": init["id"],
                "error": {"code": -32602, "message": "unsupported protocol"}
            });
            replies
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .unwrap();
            // Keep the pipes open until the test ends.
            let _ = requests.next_line().await;
        });

        let mut handshake = HandshakeCoordinator::new(&correlator, &settings);
        let err = handshake.run().await.unwrap_err();
        assert!(err.to_string().contains("unsupported protocol"));
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }
}
