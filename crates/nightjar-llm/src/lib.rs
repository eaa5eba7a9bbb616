// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider-agnostic chat client.
//!
//! [`ChatClient`] speaks three request shapes behind one `chat()` call:
//! OpenAI-compatible `/chat/completions` (also used for OpenRouter and
//! Ollama), the Anthropic Messages API, and the Gemini `generateContent`
//! API. Message and tool-call conversion is lossless for text and tool
//! calls so multi-iteration tool loops survive any provider.

mod anthropic;
mod client;
mod gemini;
mod openai;
pub mod types;

pub use client::ChatClient;
pub use types::{
    ChatMessage, ChatResponse, ContentPart, FunctionDefinition, JsonSchema, ToolCall,
    ToolDefinition,
};
