// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gemini `generateContent` request shape.
//!
//! Tools are encoded as `functionDeclarations`; tool results become
//! `functionResponse` parts on a user turn and the assistant role maps to
//! `"model"`.

use nightjar_core::NightjarError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{http_error, read_body_capped, ChatClient};
use crate::types::{ChatMessage, ChatResponse, ContentPart, ToolCall, ToolDefinition};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
struct WireContent {
    #[serde(skip_serializing_if = "String::is_empty")]
    role: String,
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "String::is_empty")]
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, PartialEq)]
struct WireFunctionCall {
    name: String,
    args: Value,
}

#[derive(Debug, Serialize, PartialEq)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize)]
struct FunctionDeclaration {
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<RespPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RespPart {
    #[serde(default)]
    text: String,
    #[serde(default)]
    function_call: Option<RespFunctionCall>,
}

#[derive(Deserialize)]
struct RespFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: String,
}

pub(crate) async fn chat(
    client: &ChatClient,
    messages: &[ChatMessage],
    tools: &[ToolDefinition],
) -> Result<ChatResponse, NightjarError> {
    let endpoint = generate_content_endpoint(&client.base_url, &client.model);
    let (contents, system) = to_gemini_messages(messages);

    let request = GenerateRequest {
        contents,
        system_instruction: if system.trim().is_empty() {
            None
        } else {
            Some(WireContent {
                role: String::new(),
                parts: vec![WirePart {
                    text: system,
                    ..Default::default()
                }],
            })
        },
        tools: if tools.is_empty() {
            None
        } else {
            Some(vec![WireTool {
                function_declarations: tools
                    .iter()
                    .map(|t| FunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: Some(t.function.parameters.to_value()),
                    })
                    .collect(),
            }])
        },
        generation_config: GenerationConfig {
            max_output_tokens: Some(client.max_tokens_value()),
            temperature: client.temperature,
        },
    };

    let mut req = client.http.post(&endpoint).json(&request);
    if !client.api_key.trim().is_empty() {
        req = req.header("x-goog-api-key", client.api_key.trim());
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

    let parsed: GenerateResponse = serde_json::from_slice(&body)
        .map_err(|e| NightjarError::provider("parse gemini response", e))?;
    let Some(candidate) = parsed.candidates.into_iter().next() else {
        if let Some(feedback) = parsed.prompt_feedback {
            if !feedback.block_reason.trim().is_empty() {
                return Err(NightjarError::provider_msg(format!(
                    "gemini blocked: {}",
                    feedback.block_reason
                )));
            }
        }
        return Err(NightjarError::provider_msg("gemini response: no candidates"));
    };

    let mut out = ChatResponse::default();
    let mut text_parts = Vec::new();
    let mut call_count = 0usize;
    for part in candidate.content.parts {
        if !part.text.trim().is_empty() {
            text_parts.push(part.text);
        }
        if let Some(call) = part.function_call {
            call_count += 1;
            let args = if call.args.is_null() {
                Value::Object(serde_json::Map::new())
            } else {
                call.args
            };
            out.tool_calls.push(ToolCall {
                id: format!("call_{call_count}"),
                name: call.name,
                arguments: args,
            });
        }
    }
    out.content = text_parts.join("\n");
    Ok(out)
}

fn generate_content_endpoint(base_url: &str, model: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let model = model.trim().trim_start_matches("models/");
    if base.contains("/v1beta") || base.ends_with("/v1") || base.contains("/v1/") {
        format!("{base}/models/{model}:generateContent")
    } else {
        format!("{base}/v1beta/models/{model}:generateContent")
    }
}

fn to_gemini_messages(messages: &[ChatMessage]) -> (Vec<WireContent>, String) {
    let mut contents = Vec::with_capacity(messages.len());
    let mut system_parts = Vec::new();

    for m in messages {
        match m.role.trim().to_ascii_lowercase().as_str() {
            "system" => {
                if !m.content.trim().is_empty() {
                    system_parts.push(m.content.clone());
                }
            }
            "user" => {
                let parts = user_parts(m);
                if !parts.is_empty() {
                    contents.push(WireContent {
                        role: "user".into(),
                        parts,
                    });
                }
            }
            "assistant" => {
                let mut parts = Vec::with_capacity(1 + m.tool_calls.len());
                if !m.content.trim().is_empty() {
                    parts.push(WirePart {
                        text: m.content.clone(),
                        ..Default::default()
                    });
                }
                for tc in &m.tool_calls {
                    parts.push(WirePart {
                        function_call: Some(WireFunctionCall {
                            name: tc.name.clone(),
                            args: tc.arguments.clone(),
                        }),
                        ..Default::default()
                    });
                }
                if !parts.is_empty() {
                    contents.push(WireContent {
                        role: "model".into(),
                        parts,
                    });
                }
            }
            "tool" => {
                let name = m
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| "tool".into());
                contents.push(WireContent {
                    role: "user".into(),
                    parts: vec![WirePart {
                        function_response: Some(WireFunctionResponse {
                            name,
                            response: tool_response_value(&m.content),
                        }),
                        ..Default::default()
                    }],
                });
            }
            _ => {}
        }
    }

    (contents, system_parts.join("\n\n"))
}

fn user_parts(m: &ChatMessage) -> Vec<WirePart> {
    if m.parts.is_empty() {
        if m.content.trim().is_empty() {
            return Vec::new();
        }
        return vec![WirePart {
            text: m.content.clone(),
            ..Default::default()
        }];
    }

    let mut out = Vec::with_capacity(m.parts.len() + 1);
    if !m.content.trim().is_empty() {
        out.push(WirePart {
            text: m.content.clone(),
            ..Default::default()
        });
    }
    for p in &m.parts {
        match p {
            ContentPart::Text { text } => {
                if !text.trim().is_empty() {
                    out.push(WirePart {
                        text: text.clone(),
                        ..Default::default()
                    });
                }
            }
            ContentPart::Image { mime_type, data } => {
                if data.trim().is_empty() {
                    continue;
                }
                out.push(WirePart {
                    inline_data: Some(InlineData {
                        mime_type: mime_type.clone(),
                        data: data.clone(),
                    }),
                    ..Default::default()
                });
            }
        }
    }
    out
}

/// Tool results must be a JSON object for `functionResponse`.
fn tool_response_value(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::json!({ "content": s }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;

    #[test]
    fn endpoint_handles_versioned_bases() {
        assert_eq!(
            generate_content_endpoint("https://generativelanguage.googleapis.com", "gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            generate_content_endpoint(
                "https://generativelanguage.googleapis.com/v1beta",
                "models/gemini-2.5-flash"
            ),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn tool_mapping_uses_model_role_and_function_parts() {
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

        let (converted, system) = to_gemini_messages(&messages);
        assert_eq!(system, "sys");
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[1].role, "model");
        assert_eq!(converted[1].parts.len(), 2);
        assert!(converted[1].parts[1].function_call.is_some());
        assert!(converted[2].parts[0].function_response.is_some());
    }

    #[test]
    fn image_parts_become_inline_data() {
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

        let (converted, _) = to_gemini_messages(&messages);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].parts.len(), 2);
        let inline = converted[0].parts[1].inline_data.as_ref().unwrap();
        assert_eq!(inline.data, "ZmFrZQ==");
        assert_eq!(inline.mime_type, "image/jpeg");
    }

    #[test]
    fn non_json_tool_result_wraps_in_content_object() {
        let value = tool_response_value("plain text output");
        assert_eq!(value["content"], "plain text output");
        let value = tool_response_value(r#"{"ok":true}"#);
        assert_eq!(value["ok"], true);
    }
}
