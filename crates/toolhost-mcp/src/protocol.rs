//! JSON-RPC 2.0 message types for MCP over stdio.
//!
//! Reference: <https://spec.modelcontextprotocol.io/>

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_PING: &str = "ping";

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub const fn new(id: u64, method: &'a str, params: Option<&'a Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> JsonRpcNotification<'a> {
    pub const fn new(method: &'a str, params: Option<&'a Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Classification of one inbound JSON message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Answer to one of our requests.
    Response {
        id: u64,
        outcome: Result<Value, Value>,
    },
    /// Answer carrying neither `result` nor `error`.
    EmptyResponse { id: u64 },
    /// Server-initiated request that expects an answer.
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    /// One-way message from the server.
    Notification { method: String },
    /// Valid JSON that is not a JSON-RPC message we understand.
    Unrecognized,
}

impl Inbound {
    /// Classify a decoded JSON value.
    ///
    /// Response ids are accepted as numbers or numeric strings, since some
    /// servers echo ids back as strings.
    pub fn classify(message: Value) -> Self {
        let Value::Object(mut obj) = message else {
            return Self::Unrecognized;
        };

        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let id = obj.remove("id").filter(|id| !id.is_null());

        match (method, id) {
            (Some(method), Some(id)) => Self::Request {
                id,
                method,
                params: obj.remove("params"),
            },
            (Some(method), None) => Self::Notification { method },
            (None, Some(id)) => {
                let Some(id) = numeric_id(&id) else {
                    return Self::Unrecognized;
                };
                if let Some(error) = obj.remove("error").filter(|e| !e.is_null()) {
                    Self::Response {
                        id,
                        outcome: Err(error),
                    }
                } else if let Some(result) = obj.remove("result") {
                    Self::Response {
                        id,
                        outcome: Ok(result),
                    }
                } else {
                    Self::EmptyResponse { id }
                }
            }
            (None, None) => Self::Unrecognized,
        }
    }
}

fn numeric_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// MCP initialize result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

/// Server information from initialize.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Server capabilities.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
    #[serde(default)]
    pub prompts: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_is_compact() {
        let params = json!({"name": "read_file", "arguments": {"path": "/tmp"}});
        let request = JsonRpcRequest::new(7, METHOD_TOOLS_CALL, Some(&params));
        let line = serde_json::to_string(&request).unwrap();
        assert_eq!(
            line,
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"read_file","arguments":{"path":"/tmp"}}}"#
        );
    }

    #[test]
    fn test_notification_omits_id_and_params() {
        let line = serde_json::to_string(&JsonRpcNotification::new(METHOD_INITIALIZED, None)).unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
    }

    #[test]
    fn test_classify_result_and_error() {
        let ok = Inbound::classify(json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": []}}));
        assert_eq!(
            ok,
            Inbound::Response {
                id: 1,
                outcome: Ok(json!({"tools": []}))
            }
        );

        let err = Inbound::classify(json!({
            "jsonrpc": "2.0", "id": 2, "result": null,
            "error": {"code": -32601, "message": "Method not found"}
        }));
        assert!(matches!(err, Inbound::Response { id: 2, outcome: Err(_) }));
    }

    #[test]
    fn test_classify_string_id() {
        let msg = Inbound::classify(json!({"jsonrpc": "2.0", "id": "12", "result": 1}));
        assert!(matches!(msg, Inbound::Response { id: 12, .. }));
    }

    #[test]
    fn test_classify_notifications_and_requests() {
        let note = Inbound::classify(json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}));
        assert!(matches!(note, Inbound::Notification { .. }));

        let ping = Inbound::classify(json!({"jsonrpc": "2.0", "id": "p1", "method": "ping"}));
        assert!(matches!(ping, Inbound::Request { ref method, .. } if method == "ping"));
    }

    #[test]
    fn test_classify_unrecognized() {
        assert_eq!(Inbound::classify(json!([1, 2])), Inbound::Unrecognized);
        assert_eq!(Inbound::classify(json!({"id": true, "result": 1})), Inbound::Unrecognized);
        assert_eq!(
            Inbound::classify(json!({"jsonrpc": "2.0", "id": 3})),
            Inbound::EmptyResponse { id: 3 }
        );
    }

    #[test]
    fn test_initialize_result_parsing() {
        let result: InitializeResult = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "fs", "version": "1.0"},
            "capabilities": {"tools": {"listChanged": true}}
        }))
        .unwrap();
        assert_eq!(result.server_info.unwrap().name, "fs");
        assert!(result.capabilities.tools.is_some());
    }
}
