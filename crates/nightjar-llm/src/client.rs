// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The provider-agnostic chat client.

use std::collections::HashMap;
use std::time::Duration;

use nightjar_core::NightjarError;
use tracing::debug;

use crate::types::{ChatMessage, ChatResponse, ToolDefinition};

/// Default request timeout for chat calls.
const CHAT_TIMEOUT: Duration = Duration::from_secs(120);

/// Response bodies above this size are truncated before parsing.
pub(crate) const MAX_RESPONSE_BYTES: usize = 8 << 20;

/// HTTP chat client for one resolved provider endpoint.
///
/// Construct once from the routed config and share (`reqwest::Client` is
/// cheaply cloneable and connection-pooled).
#[derive(Debug, Clone)]
pub struct ChatClient {
    pub provider: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub headers: HashMap<String, String>,
    pub(crate) http: reqwest::Client,
}

impl ChatClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: Option<f64>,
        headers: HashMap<String, String>,
    ) -> Result<Self, NightjarError> {
        let http = reqwest::Client::builder()
            .timeout(CHAT_TIMEOUT)
            .build()
            .map_err(|e| NightjarError::provider("failed to build HTTP client", e))?;
        Ok(Self {
            provider: provider.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            temperature,
            headers,
            http,
        })
    }

    /// One chat completion: send the message list plus tool definitions,
    /// return the assistant text and any tool calls.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, NightjarError> {
        debug!(
            provider = %self.provider,
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "chat request"
        );
        match self.provider.as_str() {
            "anthropic" => crate::anthropic::chat(self, messages, tools).await,
            "gemini" => crate::gemini::chat(self, messages, tools).await,
            // openai, openrouter, ollama, and anything else OpenAI-shaped.
            _ => crate::openai::chat(self, messages, tools).await,
        }
    }

    pub(crate) fn max_tokens_value(&self) -> u32 {
        if self.max_tokens == 0 {
            8192
        } else {
            self.max_tokens
        }
    }
}

/// Read a response body, capped at [`MAX_RESPONSE_BYTES`].
pub(crate) async fn read_body_capped(resp: reqwest::Response) -> Result<Vec<u8>, NightjarError> {
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| NightjarError::provider("read response body", e))?;
    let mut body = bytes.to_vec();
    body.truncate(MAX_RESPONSE_BYTES);
    Ok(body)
}

/// Map a non-2xx chat response to a provider error carrying the body.
pub(crate) fn http_error(status: reqwest::StatusCode, body: &[u8]) -> NightjarError {
    let text = String::from_utf8_lossy(body);
    NightjarError::provider_msg(format!("llm http {}: {}", status.as_u16(), text.trim()))
}
