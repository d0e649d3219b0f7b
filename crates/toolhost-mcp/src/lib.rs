//! Stdio MCP server management.
//!
//! Spawns tool-provider processes, speaks newline-delimited JSON-RPC over
//! their stdio, performs the `initialize` handshake, and routes tool calls
//! to whichever server declares the tool.
//!
//! ```rust,no_run
//! use toolhost_core::{McpSettings, ServerRegistry, default_config_path};
//! use toolhost_mcp::McpManager;
//!
//! # async fn run() -> Result<(), toolhost_core::McpError> {
//! let registry = ServerRegistry::load(&default_config_path()?)?;
//! let manager = McpManager::with_process_launcher(registry, McpSettings::default());
//!
//! for (server, err) in manager.start_all().await {
//!     eprintln!("{server}: {err}");
//! }
//! let result = manager
//!     .call_tool_by_name("read_file", serde_json::Map::new())
//!     .await?;
//! println!("{}", result.text());
//! manager.stop_all().await;
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]

pub mod catalog;
pub mod connection;
pub mod correlator;
pub mod framing;
pub mod handshake;
pub mod launcher;
pub mod manager;
pub mod path;
pub mod process;
pub mod protocol;
pub mod resolver;
pub mod stderr;
pub mod transport;

pub use catalog::ToolCatalog;
pub use correlator::RequestCorrelator;
pub use handshake::{HandshakeCoordinator, HandshakeState};
pub use launcher::{LaunchedServer, ProcessLauncher, ServerLauncher, ServerPipes};
pub use manager::McpManager;
pub use process::{ExitCallback, ProcessExit, ProcessHandle};
pub use transport::{BoxedReader, BoxedWriter, FrameWriter, TransportEvent};

// Re-export domain types from core for convenience
pub use toolhost_core::{
    CallToolResult, ContentBlock, McpError, McpEvent, McpEventSink, McpServerInfo,
    McpServerStatus, McpSettings, RejectedServer, ServerConfig, ServerRegistry, Tool,
};
