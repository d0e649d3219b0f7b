//! Static description of a tool-provider server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How to launch one tool-provider process.
///
/// Created once from configuration at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server name (the key in the `mcpServers` map).
    #[serde(default)]
    pub name: String,

    /// Command to execute (e.g., "npx" or "/opt/homebrew/bin/npx").
    pub command: String,

    /// Arguments passed to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables layered over the inherited environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

impl ServerConfig {
    /// Create a configuration with no extra environment.
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            env: None,
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Iterate over configured environment overrides.
    pub fn env_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env
            .iter()
            .flat_map(|env| env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Check that the entry can be launched at all.
    ///
    /// Flags and arguments belong in `args`; a command containing whitespace
    /// is almost always a mistake.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("server name cannot be empty".to_string());
        }
        if self.command.is_empty() {
            return Err(format!("server '{}': command cannot be empty", self.name));
        }
        if self.command.contains(char::is_whitespace) {
            return Err(format!(
                "server '{}': command must be an executable name/path only (e.g., 'npx'). \
                 Put flags and arguments in the 'args' field.",
                self.name
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_env_accumulates() {
        let config = ServerConfig::new("fs", "npx", vec!["-y".to_string()])
            .with_env("A", "1")
            .with_env("B", "2");

        let vars: Vec<_> = config.env_vars().collect();
        assert_eq!(vars, vec![("A", "1"), ("B", "2")]);
    }

    #[test]
    fn test_validate_rejects_command_with_args() {
        let config = ServerConfig::new("fs", "npx -y server", vec![]);
        let err = config.validate().unwrap_err();
        assert!(err.contains("args"));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        assert!(ServerConfig::new("fs", "", vec![]).validate().is_err());
        assert!(ServerConfig::new("fs", "node", vec![]).validate().is_ok());
    }
}
