//! `call`: invoke one tool and print its output.

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};

use toolhost_core::Tool;

use crate::bootstrap::CliContext;
use crate::presentation::describe_block;

/// Returns a failing exit code when the tool reports `isError`.
pub async fn execute(
    ctx: &CliContext,
    tool: &str,
    arguments: Option<Map<String, Value>>,
) -> Result<ExitCode> {
    let arguments = arguments.unwrap_or_default();
    let manager = ctx.start_manager().await?;

    let declared = manager.get_tools().await.into_iter().find(|t| t.name == tool);
    if let Some(declared) = &declared {
        if let Err(e) = check_arguments(declared, &arguments) {
            manager.stop_all().await;
            return Err(e);
        }
    }

    let outcome = manager.call_tool_by_name(tool, arguments).await;
    manager.stop_all().await;

    let result = outcome.with_context(|| format!("calling tool '{tool}'"))?;
    for block in &result.content {
        println!("{}", describe_block(block));
    }

    if result.is_error {
        eprintln!("tool '{tool}' reported an error");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Reject `--args` that omit properties the tool's schema requires.
fn check_arguments(tool: &Tool, arguments: &Map<String, Value>) -> Result<()> {
    let missing = tool.input_schema.missing_required(arguments);
    if !missing.is_empty() {
        bail!(
            "tool '{}' requires argument(s): {}",
            tool.name,
            missing.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolhost_core::{PropertyDetails, ToolInputSchema};

    fn read_file() -> Tool {
        Tool::new("read_file").with_input_schema(
            ToolInputSchema::default()
                .with_property("path", PropertyDetails::of_type("string"))
                .with_required("path"),
        )
    }

    #[test]
    fn test_missing_required_argument_is_rejected() {
        let err = check_arguments(&read_file(), &Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "tool 'read_file' requires argument(s): path");
    }

    #[test]
    fn test_complete_arguments_pass() {
        let mut arguments = Map::new();
        arguments.insert("path".to_string(), json!("/tmp/a.txt"));
        assert!(check_arguments(&read_file(), &arguments).is_ok());
    }
}
