// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible `/chat/completions` request shape.
//!
//! Also serves OpenRouter and Ollama. Tool-call arguments come back as a
//! JSON-encoded *string* on these servers; they are normalized to raw JSON
//! before reaching the tool registry.

use nightjar_core::NightjarError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{http_error, read_body_capped, ChatClient};
use crate::types::{ChatMessage, ChatResponse, ContentPart, ToolCall, ToolDefinition};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum WirePart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    /// Arguments are a JSON-encoded string on the wire.
    arguments: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<RespToolCall>,
}

#[derive(Deserialize)]
struct RespToolCall {
    #[serde(default)]
    id: String,
    function: RespFunction,
}

#[derive(Deserialize)]
struct RespFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub(crate) async fn chat(
    client: &ChatClient,
    messages: &[ChatMessage],
    tools: &[ToolDefinition],
) -> Result<ChatResponse, NightjarError> {
    let endpoint = format!("{}/chat/completions", client.base_url.trim_end_matches('/'));

    let request = ChatRequest {
        model: &client.model,
        messages: to_openai_messages(messages),
        max_tokens: Some(client.max_tokens_value()),
        temperature: client.temperature,
        tools: if tools.is_empty() { None } else { Some(tools) },
        tool_choice: if tools.is_empty() { None } else { Some("auto") },
    };

    let mut req = client.http.post(&endpoint).json(&request);
    if !client.api_key.trim().is_empty() {
        req = req.bearer_auth(client.api_key.trim());
    }
    for (k, v) in &client.headers {
        if k.trim().is_empty() {
            continue;
        }
        req = req.header(k, v);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| NightjarError::provider("llm request failed", e))?;
    let status = resp.status();
    let body = read_body_capped(resp).await?;
    if !status.is_success() {
        return Err(http_error(status, &body));
    }

    let parsed: ChatCompletion = serde_json::from_slice(&body)
        .map_err(|e| NightjarError::provider("parse llm response", e))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| NightjarError::provider_msg("llm response: no choices"))?;

    let mut out = ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls: Vec::new(),
    };
    for tc in choice.message.tool_calls {
        out.tool_calls.push(ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: normalize_arguments(tc.function.arguments),
        });
    }
    Ok(out)
}

/// OpenAI-compatible servers typically return arguments as a JSON string.
/// Decode it into raw JSON so downstream tools can deserialize structs.
pub(crate) fn normalize_arguments(args: Value) -> Value {
    match args {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    }
}

fn to_openai_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| {
            let content = if m.parts.is_empty() {
                if m.content.is_empty() && !m.tool_calls.is_empty() {
                    None
                } else {
                    Some(WireContent::Text(m.content.clone()))
                }
            } else {
                let mut parts = Vec::with_capacity(m.parts.len() + 1);
                if !m.content.trim().is_empty() {
                    parts.push(WirePart::Text {
                        text: m.content.clone(),
                    });
                }
                for p in &m.parts {
                    match p {
                        ContentPart::Text { text } => {
                            if !text.trim().is_empty() {
                                parts.push(WirePart::Text { text: text.clone() });
                            }
                        }
                        ContentPart::Image { mime_type, data } => {
                            parts.push(WirePart::ImageUrl {
                                image_url: ImageUrl {
                                    url: format!("data:{mime_type};base64,{data}"),
                                },
                            });
                        }
                    }
                }
                Some(WireContent::Parts(parts))
            };

            let tool_calls = if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|tc| WireToolCall {
                            id: tc.id.clone(),
                            kind: "function",
                            function: WireFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect(),
                )
            };

            WireMessage {
                role: m.role.clone(),
                content,
                tool_calls,
                tool_call_id: m.tool_call_id.clone(),
                name: m.name.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FunctionDefinition, JsonSchema};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> ChatClient {
        ChatClient::new(
            "openai",
            base_url,
            "test-key",
            "gpt-4o-mini",
            1024,
            Some(0.0),
            Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn string_arguments_normalize_to_json() {
        let raw = Value::String(r#"{"path":"README.md"}"#.into());
        let normalized = normalize_arguments(raw);
        assert_eq!(normalized["path"], "README.md");
    }

    #[test]
    fn null_arguments_normalize_to_empty_object() {
        assert!(normalize_arguments(Value::Null).as_object().unwrap().is_empty());
    }

    #[test]
    fn image_parts_become_data_urls() {
        let messages = vec![ChatMessage {
            role: "user".into(),
            parts: vec![
                ContentPart::Text {
                    text: "what is in this image?".into(),
                },
                ContentPart::Image {
                    mime_type: "image/png".into(),
                    data: "ZmFrZQ==".into(),
                },
            ],
            ..Default::default()
        }];
        let wire = to_openai_messages(&messages);
        let json = serde_json::to_value(&wire).unwrap();
        let parts = json[0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,ZmFrZQ==");
    }

    #[test]
    fn assistant_tool_calls_round_trip_to_wire() {
        let messages = vec![ChatMessage {
            role: "assistant".into(),
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: "read_file".into(),
                arguments: serde_json::json!({"path": "a.md"}),
            }],
            ..Default::default()
        }];
        let json = serde_json::to_value(to_openai_messages(&messages)).unwrap();
        assert!(json[0].get("content").is_none());
        assert_eq!(json[0]["tool_calls"][0]["function"]["name"], "read_file");
        // Arguments are re-encoded as a string on the wire.
        let args: Value =
            serde_json::from_str(json[0]["tool_calls"][0]["function"]["arguments"].as_str().unwrap())
                .unwrap();
        assert_eq!(args["path"], "a.md");
    }

    #[tokio::test]
    async fn chat_parses_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "4"}}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let resp = client
            .chat(&[ChatMessage::text("user", "What is 2+2?")], &[])
            .await
            .unwrap();
        assert_eq!(resp.content, "4");
        assert!(!resp.has_tool_calls());
    }

    #[tokio::test]
    async fn chat_normalizes_string_tool_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"path\":\"notes.md\"}"}
                    }]
                }}]
            })))
            .mount(&server)
            .await;

        let tools = vec![ToolDefinition::function(FunctionDefinition {
            name: "read_file".into(),
            description: "Read a file.".into(),
            parameters: JsonSchema::object(vec![("path", JsonSchema::string(""))], &["path"]),
        })];

        let client = test_client(&server.uri());
        let resp = client
            .chat(&[ChatMessage::text("user", "read notes")], &tools)
            .await
            .unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "read_file");
        assert_eq!(resp.tool_calls[0].arguments["path"], "notes.md");
    }

    #[tokio::test]
    async fn chat_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .chat(&[ChatMessage::text("user", "hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("llm http 500"), "got: {err}");
    }
}
