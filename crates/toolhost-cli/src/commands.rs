//! Subcommands.

use clap::Subcommand;
use serde_json::{Map, Value};

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start every server and list the tools they expose
    Tools,

    /// Start every server and call one tool
    Call {
        /// Tool name, as printed by `toolhost tools`
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, value_name = "JSON", value_parser = parse_arguments)]
        args: Option<Map<String, Value>>,
    },

    /// Start every server and print its status
    Servers,

    /// Validate the config and resolve each command without spawning anything
    Check,
}

/// Parse `--args` into a JSON object.
fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}
