//! `servers`: status table for every configured server.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::{format_started_at, print_separator, status_label, truncate_string};

pub async fn execute(ctx: &CliContext) -> Result<()> {
    let manager = ctx.start_manager().await?;
    let statuses = manager.server_statuses().await;
    manager.stop_all().await;

    if statuses.is_empty() {
        println!("No servers configured in {}.", ctx.config_path.display());
        return Ok(());
    }

    println!("{:<24} {:<6} {:<20} Status", "Server", "Tools", "Started");
    print_separator(90);
    for info in statuses {
        println!(
            "{:<24} {:<6} {:<20} {}",
            truncate_string(&info.name, 23),
            info.tool_count,
            format_started_at(info.started_at),
            status_label(&info.status)
        );
    }
    Ok(())
}
