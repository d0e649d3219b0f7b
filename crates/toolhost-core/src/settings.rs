//! Tunables for the manager.

use std::time::Duration;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for each step of the `initialize` handshake.
///
/// Generous because `npx`/`uvx` may download the server on first launch.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between consecutive process spawns in `start_all`.
pub const DEFAULT_START_STAGGER: Duration = Duration::from_millis(250);

/// MCP protocol revision sent in `initialize`.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpSettings {
    pub request_timeout: Duration,
    pub handshake_timeout: Duration,
    pub start_stagger: Duration,
    pub protocol_version: String,
    /// Client identity reported in `initialize`.
    pub client_name: String,
    pub client_version: String,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            start_stagger: DEFAULT_START_STAGGER,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            client_name: "toolhost".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl McpSettings {
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_start_stagger(mut self, stagger: Duration) -> Self {
        self.start_stagger = stagger;
        self
    }

    #[must_use]
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_name = name.into();
        self.client_version = version.into();
        self
    }
}
