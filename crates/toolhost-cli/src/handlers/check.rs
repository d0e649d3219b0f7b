//! `check`: validate the config and resolve every command, spawning nothing.

use anyhow::{Result, bail};

use toolhost_mcp::resolver::resolve_executable;

use crate::bootstrap::CliContext;

pub fn execute(ctx: &CliContext) -> Result<()> {
    let registry = ctx.load_registry()?;
    println!(
        "{}: {} server(s) configured",
        ctx.config_path.display(),
        registry.len()
    );

    let invalid = registry.rejected().len();
    for rejected in registry.rejected() {
        println!("  error {}: {}", rejected.name, rejected.reason);
    }

    let search_path = std::env::var_os("PATH");
    let mut unresolved = 0;
    for server in registry.iter() {
        match resolve_executable(&server.command, search_path.as_deref()) {
            Ok(found) => println!("  ok    {} -> {}", server.name, found.resolved_path.display()),
            Err(e) => {
                unresolved += 1;
                println!("  error {}: {e}", server.name);
            }
        }
    }

    if invalid > 0 {
        bail!("{invalid} server entry(ies) are invalid");
    }
    if unresolved > 0 {
        bail!("{unresolved} server command(s) could not be resolved");
    }
    Ok(())
}
