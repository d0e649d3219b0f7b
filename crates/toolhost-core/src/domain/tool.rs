//! Tool definitions discovered via `tools/list`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A named, schema-described callable exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Tool name (function name). Unique across the active server set.
    pub name: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON-Schema-like description of the accepted arguments.
    #[serde(default)]
    pub input_schema: ToolInputSchema,
}

impl Tool {
    /// Create a new tool definition with an empty object schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: ToolInputSchema::default(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: ToolInputSchema) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Top-level input schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInputSchema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, PropertyDetails>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    /// `additionalProperties`; a sub-schema in place of a boolean counts as `true`.
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<bool>,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self {
            schema_type: object_type(),
            properties: None,
            required: None,
            additional_properties: None,
        }
    }
}

impl ToolInputSchema {
    /// Add a property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, details: PropertyDetails) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), details);
        self
    }

    /// Mark a property as required.
    #[must_use]
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    /// Required property names that are absent from `arguments`.
    pub fn missing_required<'a>(&'a self, arguments: &Map<String, Value>) -> Vec<&'a str> {
        self.required
            .iter()
            .flatten()
            .filter(|name| !arguments.contains_key(name.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Schema of a single property.
///
/// Only the commonly used keywords are typed; everything else is preserved
/// in `extra` so the schema can be forwarded to a model unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDetails {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertyDetails>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PropertyDetails {
    /// A property of a single JSON type.
    pub fn of_type(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(SchemaType::Single(kind.into())),
            ..Self::default()
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// JSON Schema `type`: either one type name or a union such as `["string", "null"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaType {
    Single(String),
    Union(Vec<String>),
}

fn object_type() -> String {
    "object".to_string()
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Object(_) => Some(true),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_decodes_wire_format() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "read_file",
            "description": "Read a file",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path", "minLength": 1},
                    "encoding": {"type": ["string", "null"], "enum": ["utf8", "base64"]}
                },
                "required": ["path"],
                "additionalProperties": false
            }
        }))
        .unwrap();

        assert_eq!(tool.name, "read_file");
        let props = tool.input_schema.properties.as_ref().unwrap();
        assert_eq!(props["path"].kind, Some(SchemaType::Single("string".into())));
        assert_eq!(props["path"].extra.get("minLength"), Some(&json!(1)));
        assert_eq!(
            props["encoding"].kind,
            Some(SchemaType::Union(vec!["string".into(), "null".into()]))
        );
        assert_eq!(tool.input_schema.additional_properties, Some(false));
    }

    #[test]
    fn test_missing_schema_defaults_to_object() {
        let tool: Tool = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert_eq!(tool.input_schema.schema_type, "object");
        assert!(tool.description.is_none());
    }

    #[test]
    fn test_additional_properties_schema_counts_as_true() {
        let schema: ToolInputSchema = serde_json::from_value(json!({
            "type": "object",
            "additionalProperties": {"type": "string"}
        }))
        .unwrap();
        assert_eq!(schema.additional_properties, Some(true));
    }

    #[test]
    fn test_missing_required() {
        let schema = ToolInputSchema::default()
            .with_property("path", PropertyDetails::of_type("string"))
            .with_required("path")
            .with_required("mode");

        let mut arguments = Map::new();
        assert_eq!(schema.missing_required(&arguments), vec!["path", "mode"]);

        arguments.insert("path".to_string(), json!("/tmp"));
        assert_eq!(schema.missing_required(&arguments), vec!["mode"]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let tool = Tool::new("ping").with_description("Ping");
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["inputSchema"]["type"], "object");
        assert!(json.get("input_schema").is_none());
    }
}
