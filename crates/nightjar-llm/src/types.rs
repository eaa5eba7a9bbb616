// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat message, tool, and schema types shared by all providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single chat message in the provider-agnostic shape.
///
/// `content` is plain text; `parts` carries optional multimodal content
/// (text segments and base64 images) for user messages. Assistant messages
/// may carry `tool_calls`; tool-result messages carry `tool_call_id` and
/// the tool `name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// A plain text message with the given role.
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: role.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// A tool-result message answering `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ChatMessage {
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// A multimodal content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Base64 image data with its MIME type.
    Image { mime_type: String, data: String },
}

/// A tool invocation requested by the model.
///
/// `arguments` is always raw JSON here; provider quirks (OpenAI-compatible
/// servers returning a JSON *string*) are normalized at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The model's reply for one iteration of the tool loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    pub fn function(function: FunctionDefinition) -> Self {
        ToolDefinition {
            kind: "function",
            function,
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub parameters: JsonSchema,
}

/// A small subset of JSON Schema used for tool parameter declarations.
///
/// `raw` is an escape hatch: when set, it is serialized verbatim and all
/// other fields are ignored.
#[derive(Debug, Clone, Default)]
pub struct JsonSchema {
    pub schema_type: String,
    pub description: String,
    pub properties: Vec<(String, JsonSchema)>,
    pub required: Vec<String>,
    pub enum_values: Vec<String>,
    pub items: Option<Box<JsonSchema>>,
    pub raw: Option<Value>,
}

impl JsonSchema {
    pub fn object(properties: Vec<(&str, JsonSchema)>, required: &[&str]) -> Self {
        JsonSchema {
            schema_type: "object".into(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            required: required.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn string(description: &str) -> Self {
        JsonSchema {
            schema_type: "string".into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn string_enum(values: &[&str]) -> Self {
        JsonSchema {
            schema_type: "string".into(),
            enum_values: values.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn integer(description: &str) -> Self {
        JsonSchema {
            schema_type: "integer".into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn number(description: &str) -> Self {
        JsonSchema {
            schema_type: "number".into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn boolean(description: &str) -> Self {
        JsonSchema {
            schema_type: "boolean".into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn raw(value: Value) -> Self {
        JsonSchema {
            raw: Some(value),
            ..Default::default()
        }
    }

    /// Render to a plain JSON value (used by the Anthropic and Gemini
    /// converters, which embed schemas verbatim).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for JsonSchema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if let Some(raw) = &self.raw {
            return raw.serialize(serializer);
        }

        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(None)?;
        if !self.schema_type.is_empty() {
            map.serialize_entry("type", &self.schema_type)?;
        }
        if !self.description.is_empty() {
            map.serialize_entry("description", &self.description)?;
        }
        if !self.properties.is_empty() {
            let props: std::collections::BTreeMap<&str, &JsonSchema> = self
                .properties
                .iter()
                .map(|(k, v)| (k.as_str(), v))
                .collect();
            map.serialize_entry("properties", &props)?;
        }
        if !self.required.is_empty() {
            map.serialize_entry("required", &self.required)?;
        }
        if !self.enum_values.is_empty() {
            map.serialize_entry("enum", &self.enum_values)?;
        }
        if let Some(items) = &self.items {
            map.serialize_entry("items", items)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_serializes_subset_fields() {
        let schema = JsonSchema::object(
            vec![("path", JsonSchema::string("File path."))],
            &["path"],
        );
        let value = schema.to_value();
        assert_eq!(value["type"], "object");
        assert_eq!(value["properties"]["path"]["type"], "string");
        assert_eq!(value["required"][0], "path");
    }

    #[test]
    fn raw_schema_wins() {
        let schema = JsonSchema::raw(serde_json::json!({
            "type": "object",
            "additionalProperties": {"type": "string"}
        }));
        let value = schema.to_value();
        assert_eq!(value["additionalProperties"]["type"], "string");
    }

    #[test]
    fn enum_schema_lists_values() {
        let schema = JsonSchema::string_enum(&["markdown", "text"]);
        let value = schema.to_value();
        assert_eq!(value["enum"][0], "markdown");
        assert_eq!(value["enum"][1], "text");
    }

    #[test]
    fn tool_result_sets_role_and_ids() {
        let msg = ChatMessage::tool_result("call_1", "read_file", "{}");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("read_file"));
    }
}
