//! `tools`: list every tool with the server that owns it.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::truncate_string;

pub async fn execute(ctx: &CliContext) -> Result<()> {
    let manager = ctx.start_manager().await?;
    let tools = manager.tools_by_server().await;
    manager.stop_all().await;

    if tools.is_empty() {
        println!("No tools available.");
        return Ok(());
    }

    for (server, tool) in tools {
        let description = tool.description.as_deref().unwrap_or("");
        let description = truncate_string(description.lines().next().unwrap_or(""), 100);
        println!("{server}/{}: {description}", tool.name);
    }
    Ok(())
}
