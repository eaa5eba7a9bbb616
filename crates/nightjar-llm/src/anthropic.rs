// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API request shape.
//!
//! System messages become the request-level `system` string; tool calls
//! and results become interleaved `tool_use` / `tool_result` content
//! parts. Tool results are batched into a single user message until the
//! next user/assistant turn, matching the API's alternation rules.

use nightjar_core::NightjarError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{http_error, read_body_capped, ChatClient};
use crate::types::{ChatMessage, ChatResponse, ContentPart, ToolCall, ToolDefinition};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
struct WireMessage {
    role: String,
    content: Vec<WirePart>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize, PartialEq)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Serialize)]
struct WireTool {
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    input_schema: Value,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<RespPart>,
}

#[derive(Deserialize)]
struct RespPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    input: Value,
}

pub(crate) async fn chat(
    client: &ChatClient,
    messages: &[ChatMessage],
    tools: &[ToolDefinition],
) -> Result<ChatResponse, NightjarError> {
    let endpoint = messages_endpoint(&client.base_url);
    let (wire_messages, system) = to_anthropic_messages(messages);

    let request = MessagesRequest {
        model: &client.model,
        messages: wire_messages,
        system,
        tools: if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| WireTool {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        input_schema: t.function.parameters.to_value(),
                    })
                    .collect(),
            )
        },
        max_tokens: client.max_tokens_value(),
        temperature: client.temperature,
    };

    let mut req = client
        .http
        .post(&endpoint)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&request);
    if !client.api_key.trim().is_empty() {
        req = req.header("x-api-key", client.api_key.trim());
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

    let parsed: MessagesResponse = serde_json::from_slice(&body)
        .map_err(|e| NightjarError::provider("parse anthropic response", e))?;
    if parsed.content.is_empty() {
        return Err(NightjarError::provider_msg("anthropic response: empty content"));
    }

    let mut out = ChatResponse::default();
    let mut text_parts = Vec::new();
    for (i, part) in parsed.content.into_iter().enumerate() {
        match part.kind.as_str() {
            "text" => {
                if !part.text.trim().is_empty() {
                    text_parts.push(part.text);
                }
            }
            "tool_use" => {
                let id = if part.id.trim().is_empty() {
                    format!("toolu_{}", i + 1)
                } else {
                    part.id
                };
                let input = if part.input.is_null() {
                    Value::Object(serde_json::Map::new())
                } else {
                    part.input
                };
                out.tool_calls.push(ToolCall {
                    id,
                    name: part.name,
                    arguments: input,
                });
            }
            _ => {}
        }
    }
    out.content = text_parts.join("\n");
    Ok(out)
}

fn messages_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/messages")
    } else {
        format!("{base}/v1/messages")
    }
}

fn to_anthropic_messages(messages: &[ChatMessage]) -> (Vec<WireMessage>, String) {
    let mut out: Vec<WireMessage> = Vec::with_capacity(messages.len());
    let mut system_parts: Vec<String> = Vec::new();
    let mut pending_tool_results: Vec<WirePart> = Vec::new();

    fn flush(out: &mut Vec<WireMessage>, pending: &mut Vec<WirePart>) {
        if pending.is_empty() {
            return;
        }
        out.push(WireMessage {
            role: "user".into(),
            content: std::mem::take(pending),
        });
    }

    for m in messages {
        match m.role.trim().to_ascii_lowercase().as_str() {
            "system" => {
                if !m.content.trim().is_empty() {
                    system_parts.push(m.content.clone());
                }
            }
            "tool" => {
                pending_tool_results.push(WirePart::ToolResult {
                    tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                    content: m.content.clone(),
                });
            }
            role @ ("user" | "assistant") => {
                flush(&mut out, &mut pending_tool_results);

                let mut parts = input_parts(m);
                if role == "assistant" {
                    for (i, tc) in m.tool_calls.iter().enumerate() {
                        let id = if tc.id.trim().is_empty() {
                            format!("toolu_{}", i + 1)
                        } else {
                            tc.id.clone()
                        };
                        parts.push(WirePart::ToolUse {
                            id,
                            name: tc.name.clone(),
                            input: tc.arguments.clone(),
                        });
                    }
                }
                if !parts.is_empty() {
                    out.push(WireMessage {
                        role: role.into(),
                        content: parts,
                    });
                }
            }
            _ => {}
        }
    }
    flush(&mut out, &mut pending_tool_results);
    (out, system_parts.join("\n\n"))
}

fn input_parts(m: &ChatMessage) -> Vec<WirePart> {
    if m.parts.is_empty() {
        if m.content.trim().is_empty() {
            return Vec::new();
        }
        return vec![WirePart::Text {
            text: m.content.clone(),
        }];
    }

    let mut out = Vec::with_capacity(m.parts.len() + 1);
    if !m.content.trim().is_empty() {
        out.push(WirePart::Text {
            text: m.content.clone(),
        });
    }
    for p in &m.parts {
        match p {
            ContentPart::Text { text } => {
                if !text.trim().is_empty() {
                    out.push(WirePart::Text { text: text.clone() });
                }
            }
            ContentPart::Image { mime_type, data } => {
                if data.trim().is_empty() {
                    continue;
                }
                let media_type = if mime_type.trim().is_empty() {
                    "image/jpeg".to_string()
                } else {
                    mime_type.clone()
                };
                out.push(WirePart::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type,
                        data: data.clone(),
                    },
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;

    #[test]
    fn endpoint_handles_v1_suffix() {
        assert_eq!(
            messages_endpoint("https://api.anthropic.com"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            messages_endpoint("https://api.anthropic.com/v1"),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn tool_mapping_interleaves_use_and_result() {
        let messages = vec![
            ChatMessage::text("system", "sys"),
            ChatMessage::text("user", "hello"),
            ChatMessage {
                role: "assistant".into(),
                content: "calling tool".into(),
                tool_calls: vec![ToolCall {
                    id: "call_1".into(),
                    name: "read_file".into(),
                    arguments: serde_json::json!({"path": "README.md"}),
                }],
                ..Default::default()
            },
            ChatMessage::tool_result("call_1", "read_file", r#"{"ok":true}"#),
        ];

        let (converted, system) = to_anthropic_messages(&messages);
        assert_eq!(system, "sys");
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[1].role, "assistant");
        assert_eq!(converted[1].content.len(), 2);
        assert!(matches!(converted[1].content[1], WirePart::ToolUse { .. }));
        assert!(matches!(converted[2].content[0], WirePart::ToolResult { .. }));
        assert_eq!(converted[2].role, "user");
    }

    #[test]
    fn image_parts_become_base64_sources() {
        let messages = vec![
            ChatMessage::text("system", "sys"),
            ChatMessage {
                role: "user".into(),
                parts: vec![
                    ContentPart::Text {
                        text: "describe".into(),
                    },
                    ContentPart::Image {
                        mime_type: "image/jpeg".into(),
                        data: "ZmFrZQ==".into(),
                    },
                ],
                ..Default::default()
            },
        ];

        let (converted, _) = to_anthropic_messages(&messages);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].content.len(), 2);
        match &converted[0].content[1] {
            WirePart::Image { source } => {
                assert_eq!(source.media_type, "image/jpeg");
                assert_eq!(source.data, "ZmFrZQ==");
            }
            other => panic!("expected image part, got {other:?}"),
        }
    }

    #[test]
    fn consecutive_tool_results_batch_into_one_user_message() {
        let messages = vec![
            ChatMessage {
                role: "assistant".into(),
                content: String::new(),
                tool_calls: vec![
                    ToolCall {
                        id: "a".into(),
                        name: "read_file".into(),
                        arguments: serde_json::json!({}),
                    },
                    ToolCall {
                        id: "b".into(),
                        name: "list_dir".into(),
                        arguments: serde_json::json!({}),
                    },
                ],
                ..Default::default()
            },
            ChatMessage::tool_result("a", "read_file", "one"),
            ChatMessage::tool_result("b", "list_dir", "two"),
        ];

        let (converted, _) = to_anthropic_messages(&messages);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[1].content.len(), 2);
    }
}
