//! Server lifecycle events and the sink they are emitted to.

use serde::{Deserialize, Serialize};

/// Lifecycle events emitted by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpEvent {
    /// Handshake and tool discovery completed.
    ServerStarted { name: String, tool_count: usize },
    /// Server was stopped on request.
    ServerStopped { name: String },
    /// Server process exited (or closed stdout) without being asked to.
    ServerExited { name: String, code: Option<i32> },
    /// Spawn or handshake failed.
    ServerFailed { name: String, message: String },
    /// Tool cache for a server was replaced.
    ToolsRefreshed { name: String, tool_count: usize },
}

/// Trait for emitting lifecycle events.
///
/// Implementations must not block; the manager emits from inside its own
/// tasks.
pub trait McpEventSink: Send + Sync {
    fn emit(&self, event: McpEvent);
}

/// Discards all events. Default for CLI contexts and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl McpEventSink for NoopEventSink {
    fn emit(&self, _event: McpEvent) {}
}
