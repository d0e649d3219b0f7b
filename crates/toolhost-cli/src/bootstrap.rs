//! Wiring shared by every command: logging, config and manager construction.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use toolhost_core::{McpSettings, ServerRegistry, default_config_path};
use toolhost_mcp::McpManager;

use crate::parser::Cli;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `warn`, or `debug` with `--verbose`.
/// Logs go to stderr so command output stays clean on stdout.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
}

/// Resolved inputs for a command.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config_path: PathBuf,
    pub settings: McpSettings,
}

impl CliContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };

        let mut settings = McpSettings::default();
        if let Some(ms) = cli.timeout_ms {
            settings = settings.with_request_timeout(Duration::from_millis(ms));
        }

        Ok(Self {
            config_path,
            settings,
        })
    }

    pub fn load_registry(&self) -> Result<ServerRegistry> {
        ServerRegistry::load(&self.config_path)
            .with_context(|| format!("loading {}", self.config_path.display()))
    }

    /// Build a manager over the configured servers and start all of them.
    ///
    /// Servers that fail to start are reported on stderr; the rest stay usable.
    pub async fn start_manager(&self) -> Result<McpManager> {
        let registry = self.load_registry()?;
        let manager = McpManager::with_process_launcher(registry, self.settings.clone());

        for (server, err) in manager.start_all().await {
            eprintln!("warning: server '{server}' failed to start: {err}");
        }
        Ok(manager)
    }
}
