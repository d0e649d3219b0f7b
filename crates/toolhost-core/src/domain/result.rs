//! Result of a `tools/call` invocation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One item of tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        /// Base64-encoded image bytes.
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ContentBlock {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image block from already-encoded data.
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Decode the bytes of an image block. Returns `None` for text blocks.
    pub fn image_bytes(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        match self {
            Self::Image { data, .. } => Some(STANDARD.decode(data)),
            Self::Text { .. } => None,
        }
    }
}

/// Decoded `tools/call` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// Wire payloads express this as a boolean or as numeric 0/1.
    #[serde(default, deserialize_with = "bool_or_number")]
    pub is_error: bool,
}

impl CallToolResult {
    /// A successful result holding a single text block.
    pub fn success_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
        }
    }

    /// Decode a JSON-RPC `result` value.
    ///
    /// Content items with an unknown `type` are dropped (and logged) so that
    /// one unsupported block does not hide the rest of the output.
    pub fn from_wire(result: &Value) -> Result<Self, serde_json::Error> {
        let is_error = match result.get("isError") {
            Some(value) => bool_or_number(value.clone())?,
            None => false,
        };

        let items = match result.get("content") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(Value::Null) | None => &[],
            Some(other) => {
                return Err(serde::de::Error::custom(format!(
                    "expected content array, got {other}"
                )));
            }
        };

        let mut content = Vec::with_capacity(items.len());
        for item in items {
            match ContentBlock::deserialize(item) {
                Ok(block) => content.push(block),
                Err(e) => {
                    let kind = item.get("type").and_then(Value::as_str).unwrap_or("?");
                    tracing::warn!(content_type = kind, error = %e, "Skipping unsupported content block");
                }
            }
        }

        Ok(Self { content, is_error })
    }

    /// Concatenate all text blocks, separated by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn bool_or_number<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        other => Err(serde::de::Error::custom(format!(
            "isError must be a boolean or number, got {other}"
        ))),
    }
}
