//! `toolhost` command-line interface.
//!
//! Loads the MCP server config, starts the configured servers, and lists
//! their tools, calls one of them, or prints server status.
#![deny(unsafe_code)]

pub mod bootstrap;
pub mod commands;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use bootstrap::{CliContext, init_tracing};
pub use commands::Commands;
pub use parser::Cli;
