//! `toolhost` entry point.

use std::process::ExitCode;

use clap::Parser;

use toolhost_cli::{Cli, CliContext, Commands, handlers, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = CliContext::from_cli(&cli)?;

    match cli.command {
        Commands::Tools => handlers::tools::execute(&ctx).await?,
        Commands::Call { tool, args } => return handlers::call::execute(&ctx, &tool, args).await,
        Commands::Servers => handlers::servers::execute(&ctx).await?,
        Commands::Check => handlers::check::execute(&ctx)?,
    }

    Ok(ExitCode::SUCCESS)
}
