//! Tool discovery cache and call routing.
//!
//! [`ToolCatalog`] is plain data owned by the manager; the async helpers
//! [`fetch_tools`] and [`invoke_tool`] talk to one server through its
//! correlator.

use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use toolhost_core::{CallToolResult, McpError, Tool};

use crate::correlator::RequestCorrelator;
use crate::protocol::{METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};

/// Upper bound on `tools/list` pages followed through `nextCursor`.
pub const MAX_TOOL_PAGES: usize = 32;

/// Cached tool lists, one entry per running server, in start order.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<(String, Vec<Tool>)>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached tools for `server`. New servers go last.
    pub fn replace(&mut self, server: &str, tools: Vec<Tool>) {
        if let Some((_, cached)) = self.entries.iter_mut().find(|(name, _)| name == server) {
            *cached = tools;
        } else {
            self.entries.push((server.to_string(), tools));
        }
    }

    /// Reorder entries by `rank`. Ties keep their current order.
    pub fn order_by(&mut self, rank: impl Fn(&str) -> usize) {
        self.entries.sort_by_key(|(name, _)| rank(name));
    }

    /// Forget a server's tools. Returns true if it had an entry.
    pub fn remove(&mut self, server: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(name, _)| name != server);
        self.entries.len() != before
    }

    /// First server, in start order, that declares `tool`.
    pub fn find_owner(&self, tool: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, tools)| tools.iter().any(|t| t.name == tool))
            .map(|(server, _)| server.as_str())
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.find_owner(tool).is_some()
    }

    /// Tools of every server, in start order.
    pub fn all_tools(&self) -> Vec<Tool> {
        self.entries
            .iter()
            .flat_map(|(_, tools)| tools.iter().cloned())
            .collect()
    }

    /// `(server, tool)` pairs, in start order.
    pub fn tools_by_server(&self) -> impl Iterator<Item = (&str, &Tool)> {
        self.entries
            .iter()
            .flat_map(|(server, tools)| tools.iter().map(move |t| (server.as_str(), t)))
    }

    pub fn tools_for(&self, server: &str) -> Option<&[Tool]> {
        self.entries
            .iter()
            .find(|(name, _)| name == server)
            .map(|(_, tools)| tools.as_slice())
    }

    pub fn tool_count(&self, server: &str) -> usize {
        self.tools_for(server).map_or(0, <[Tool]>::len)
    }
}

/// List a server's tools, following pagination.
///
/// Entries that fail to decode are skipped; the rest of the page is kept.
pub async fn fetch_tools(
    correlator: &RequestCorrelator,
    timeout: Duration,
) -> Result<Vec<Tool>, McpError> {
    let server = correlator.server();
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 0..MAX_TOOL_PAGES {
        let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
        let result = correlator.call(METHOD_TOOLS_LIST, params, timeout).await?;

        let Some(items) = result.get("tools").and_then(Value::as_array) else {
            return Err(McpError::InvalidResponse {
                server: server.to_string(),
                reason: "tools/list result has no 'tools' array".to_string(),
            });
        };

        for item in items {
            match serde_json::from_value::<Tool>(item.clone()) {
                Ok(tool) => tools.push(tool),
                Err(e) => {
                    let name = item.get("name").and_then(Value::as_str).unwrap_or("?");
                    warn!(server = %server, tool = name, error = %e, "Skipping undecodable tool");
                }
            }
        }

        cursor = result
            .get("nextCursor")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(ToString::to_string);
        if cursor.is_none() {
            debug!(server = %server, count = tools.len(), pages = page + 1, "Tools listed");
            return Ok(tools);
        }
    }

    warn!(
        server = %server,
        max_pages = MAX_TOOL_PAGES,
        "tools/list pagination limit reached, keeping tools fetched so far"
    );
    Ok(tools)
}

/// Call `tool` on the server behind `correlator`.
pub async fn invoke_tool(
    correlator: &RequestCorrelator,
    tool: &str,
    arguments: Map<String, Value>,
    timeout: Duration,
) -> Result<CallToolResult, McpError> {
    let params = json!({ "name": tool, "arguments": arguments });
    let result = correlator
        .call(METHOD_TOOLS_CALL, Some(params), timeout)
        .await?;

    CallToolResult::from_wire(&result).map_err(|e| McpError::InvalidResponse {
        server: correlator.server().to_string(),
        reason: format!("invalid tools/call result: {e}"),
    })
}
