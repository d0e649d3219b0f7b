//! MCP domain types.
//!
//! These types represent tool-provider servers and the tools they expose,
//! independent of process management or transport concerns.
//!
//! # Design
//!
//! - `ServerConfig` - How to launch one server (command, args, env)
//! - `Tool` / `ToolInputSchema` / `PropertyDetails` - Tools from `tools/list`
//! - `CallToolResult` / `ContentBlock` - Output of `tools/call`
//! - `McpServerStatus` / `McpServerInfo` - Runtime status snapshots

mod config;
mod result;
mod status;
mod tool;

pub use config::ServerConfig;
pub use result::{CallToolResult, ContentBlock};
pub use status::{McpServerInfo, McpServerStatus};
pub use tool::{PropertyDetails, SchemaType, Tool, ToolInputSchema};
