//! Loading the list of servers to manage.
//!
//! The config file uses the widely shared `mcpServers` layout:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "filesystem": { "command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"] },
//!     "calendar":   { "command": "uvx", "args": ["calendar-mcp"], "env": { "TZ": "UTC" } }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::domain::ServerConfig;
use crate::error::McpError;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "TOOLHOST_MCP_CONFIG";

/// Wire shape of the config file. Entries are decoded one by one so a bad
/// entry cannot hide the good ones.
#[derive(Debug, Deserialize)]
struct McpServersFile {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: BTreeMap<String, Value>,
}

/// A config entry that was left out of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedServer {
    pub name: String,
    pub reason: String,
}

impl RejectedServer {
    /// The `InvalidConfig` error reported when this server is started.
    pub fn error(&self) -> McpError {
        McpError::InvalidConfig(self.reason.clone())
    }
}

/// Ordered, immutable set of server configurations.
///
/// Entries are kept sorted by name so startup order is deterministic.
/// Invalid entries only affect themselves: they are recorded in
/// [`Self::rejected`] and never started.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: Vec<ServerConfig>,
    rejected: Vec<RejectedServer>,
}

impl ServerRegistry {
    /// Build a registry from configurations.
    ///
    /// Entries that fail validation, and later entries reusing a name, are
    /// moved to [`Self::rejected`].
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        Self::from_entries(servers.into_iter().map(Ok).collect())
    }

    fn from_entries(entries: Vec<Result<ServerConfig, RejectedServer>>) -> Self {
        let mut servers: Vec<ServerConfig> = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();

        for entry in entries {
            let config = match entry {
                Ok(config) => config,
                Err(reject) => {
                    rejected.push(reject);
                    continue;
                }
            };
            if let Err(reason) = config.validate() {
                rejected.push(RejectedServer {
                    name: config.name,
                    reason,
                });
            } else if servers.iter().any(|s| s.name == config.name) {
                rejected.push(RejectedServer {
                    reason: format!("duplicate server name '{}'", config.name),
                    name: config.name,
                });
            } else {
                servers.push(config);
            }
        }

        for reject in &rejected {
            tracing::warn!(server = %reject.name, reason = %reject.reason, "Skipping invalid MCP server entry");
        }
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Self { servers, rejected }
    }

    /// Read and parse a config file.
    ///
    /// Only a missing or unparseable file fails as a whole.
    pub fn load(path: &Path) -> Result<Self, McpError> {
        if !path.exists() {
            return Err(McpError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            McpError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        let registry = Self::parse(&content)?;
        tracing::debug!(
            path = %path.display(),
            servers = registry.len(),
            rejected = registry.rejected.len(),
            "Loaded MCP server config"
        );
        Ok(registry)
    }

    /// Parse config file contents.
    pub fn parse(content: &str) -> Result<Self, McpError> {
        let file: McpServersFile = serde_json::from_str(content)
            .map_err(|e| McpError::InvalidConfig(format!("invalid JSON: {e}")))?;

        let entries = file
            .mcp_servers
            .into_iter()
            .map(|(name, raw)| match serde_json::from_value::<ServerConfig>(raw) {
                Ok(mut config) => {
                    config.name = name;
                    Ok(config)
                }
                Err(e) => Err(RejectedServer {
                    reason: format!("server '{name}': {e}"),
                    name,
                }),
            })
            .collect();

        Ok(Self::from_entries(entries))
    }

    /// Look up a configuration by server name.
    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Iterate in startup order.
    pub fn iter(&self) -> impl Iterator<Item = &ServerConfig> {
        self.servers.iter()
    }

    /// Configured server names in startup order.
    pub fn names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name.clone()).collect()
    }

    /// Entries left out because they were invalid.
    pub fn rejected(&self) -> &[RejectedServer] {
        &self.rejected
    }

    pub fn find_rejected(&self, name: &str) -> Option<&RejectedServer> {
        self.rejected.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Default config location.
///
/// `$TOOLHOST_MCP_CONFIG` wins when set; otherwise `<config dir>/toolhost/mcp.json`.
pub fn default_config_path() -> Result<PathBuf, McpError> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("toolhost").join("mcp.json"))
        .ok_or_else(|| {
            McpError::InvalidConfig("cannot determine the user config directory".to_string())
        })
}
