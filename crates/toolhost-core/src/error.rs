//! Error taxonomy for tool-provider management.
//!
//! Every failure a caller can observe is one of these variants. Errors scoped
//! to a single server carry that server's name so callers can attribute them
//! without parsing messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading configuration, managing server processes,
/// or exchanging JSON-RPC messages with them.
#[derive(Debug, Error)]
pub enum McpError {
    /// The configuration file does not exist.
    #[error("MCP config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be used.
    #[error("Invalid MCP configuration: {0}")]
    InvalidConfig(String),

    /// The server executable could not be resolved or `exec` failed.
    #[error("Failed to spawn MCP server '{name}': {reason}")]
    ProcessSpawn { name: String, reason: String },

    /// The `initialize` handshake or initial tool discovery failed.
    #[error("MCP server '{name}' initialization failed: {cause}")]
    ServerInitializationFailed { name: String, cause: String },

    /// A start was requested for a server that is already running.
    #[error("MCP server already running: {0}")]
    AlreadyRunning(String),

    /// No configured or running server has this name.
    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    /// No running server declares a tool with this name.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A framed line from the server was not valid JSON.
    #[error("Malformed message from '{server}': {reason}")]
    MalformedMessage {
        server: String,
        raw: String,
        reason: String,
    },

    /// No response arrived before the per-call deadline.
    #[error("Request '{method}' to '{server}' timed out after {timeout_ms}ms")]
    RequestTimedOut {
        server: String,
        method: String,
        timeout_ms: u64,
    },

    /// The server answered with a JSON-RPC `error` object.
    #[error("MCP server '{server}' returned error: {}", describe_rpc_error(.payload))]
    ServerReportedError {
        server: String,
        payload: serde_json::Value,
    },

    /// The server was stopped or exited while the request was pending.
    #[error("MCP server stopped: {0}")]
    ServerStopped(String),

    /// Writing to or reading from the server's pipes failed.
    #[error("Transport error for '{server}': {reason}")]
    Transport { server: String, reason: String },

    /// A well-formed JSON message did not have the expected shape.
    #[error("Invalid response from '{server}': {reason}")]
    InvalidResponse { server: String, reason: String },
}

impl McpError {
    /// Name of the server this error belongs to, if it is server-scoped.
    pub fn server(&self) -> Option<&str> {
        match self {
            Self::ProcessSpawn { name, .. }
            | Self::ServerInitializationFailed { name, .. }
            | Self::AlreadyRunning(name)
            | Self::ServerNotFound(name)
            | Self::ServerStopped(name) => Some(name),
            Self::MalformedMessage { server, .. }
            | Self::RequestTimedOut { server, .. }
            | Self::ServerReportedError { server, .. }
            | Self::Transport { server, .. }
            | Self::InvalidResponse { server, .. } => Some(server),
            Self::ConfigNotFound(_) | Self::InvalidConfig(_) | Self::ToolNotFound(_) => None,
        }
    }

    /// True when the error concerns one server and leaves the others usable.
    pub fn is_server_scoped(&self) -> bool {
        self.server().is_some()
    }

    /// Broad category for UI handling.
    pub const fn category(&self) -> McpErrorCategory {
        match self {
            Self::ConfigNotFound(_) | Self::InvalidConfig(_) => McpErrorCategory::Configuration,
            Self::ProcessSpawn { .. }
            | Self::ServerInitializationFailed { .. }
            | Self::AlreadyRunning(_)
            | Self::ServerNotFound(_)
            | Self::ServerStopped(_) => McpErrorCategory::Process,
            Self::MalformedMessage { .. }
            | Self::RequestTimedOut { .. }
            | Self::Transport { .. }
            | Self::InvalidResponse { .. } => McpErrorCategory::Protocol,
            Self::ToolNotFound(_) | Self::ServerReportedError { .. } => McpErrorCategory::Tool,
        }
    }
}

/// Categories of MCP errors for UI handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpErrorCategory {
    /// Server process lifecycle error.
    Process,
    /// Protocol communication error.
    Protocol,
    /// Tool lookup or invocation error.
    Tool,
    /// Configuration error.
    Configuration,
}

/// Render a JSON-RPC error payload as `[code] message` when it has that shape.
fn describe_rpc_error(payload: &serde_json::Value) -> String {
    let code = payload.get("code").and_then(serde_json::Value::as_i64);
    let message = payload.get("message").and_then(serde_json::Value::as_str);
    match (code, message) {
        (Some(code), Some(message)) => format!("[{code}] {message}"),
        (None, Some(message)) => message.to_string(),
        _ => payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_reported_error_display_uses_code_and_message() {
        let err = McpError::ServerReportedError {
            server: "fs".to_string(),
            payload: json!({"code": -32601, "message": "Method not found"}),
        };
        assert_eq!(
            err.to_string(),
            "MCP server 'fs' returned error: [-32601] Method not found"
        );
    }

    #[test]
    fn test_server_reported_error_display_falls_back_to_raw_payload() {
        let err = McpError::ServerReportedError {
            server: "fs".to_string(),
            payload: json!("boom"),
        };
        assert!(err.to_string().ends_with("\"boom\""));
    }

    #[test]
    fn test_server_scoping() {
        let timed_out = McpError::RequestTimedOut {
            server: "calendar".to_string(),
            method: "tools/call".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(timed_out.server(), Some("calendar"));
        assert!(timed_out.is_server_scoped());
        assert_eq!(timed_out.category(), McpErrorCategory::Protocol);

        let missing = McpError::ToolNotFound("nonexistent".to_string());
        assert_eq!(missing.server(), None);
        assert_eq!(missing.category(), McpErrorCategory::Tool);
    }
}
