//! Core domain types for toolhost.
//!
//! This crate has no process or transport code. It defines what a
//! tool-provider server is (`ServerConfig`, `ServerRegistry`), what it exposes
//! (`Tool`, `CallToolResult`), how failures are reported (`McpError`), and the
//! tunables and events shared by the manager and its callers.
#![deny(unsafe_code)]

pub mod domain;
pub mod error;
pub mod events;
pub mod registry;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    CallToolResult, ContentBlock, McpServerInfo, McpServerStatus, PropertyDetails, SchemaType,
    ServerConfig, Tool, ToolInputSchema,
};
pub use error::{McpError, McpErrorCategory};
pub use events::{McpEvent, McpEventSink, NoopEventSink};
pub use registry::{CONFIG_PATH_ENV, RejectedServer, ServerRegistry, default_config_path};
pub use settings::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PROTOCOL_VERSION, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_START_STAGGER, McpSettings,
};
