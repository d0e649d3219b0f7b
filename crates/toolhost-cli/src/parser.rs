//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;
use toolhost_core::CONFIG_PATH_ENV;

use crate::commands::Commands;

/// Start stdio MCP servers and use their tools.
#[derive(Debug, Parser)]
#[command(name = "toolhost")]
#[command(about = "List and call tools exposed by stdio MCP servers")]
#[command(version)]
pub struct Cli {
    /// Path to the MCP server config (`{"mcpServers": {...}}`)
    #[arg(long, global = true, env = CONFIG_PATH_ENV, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long = "timeout-ms", global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}
