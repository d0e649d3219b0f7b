//! Runtime status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Runtime status of a configured server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerStatus {
    /// Server is not running
    #[default]
    Stopped,
    /// Process spawned, handshake in progress
    Starting,
    /// Handshake completed and the process is alive
    Running,
    /// Spawn, handshake, or the process itself failed
    Failed(String),
}

impl McpServerStatus {
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Point-in-time view of one configured server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerInfo {
    pub name: String,
    pub status: McpServerStatus,
    /// Number of cached tools (zero unless running).
    pub tool_count: usize,
    /// When the handshake completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&McpServerStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");

        let failed = serde_json::to_value(McpServerStatus::Failed("boom".into())).unwrap();
        assert_eq!(failed["failed"], "boom");
    }
}
