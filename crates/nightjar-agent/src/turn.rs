// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The iterative tool-calling loop shared by the main agent and subagents.

use tracing::{debug, warn};

use nightjar_core::NightjarError;
use nightjar_llm::{ChatClient, ChatMessage, ToolCall};
use nightjar_tools::{Registry, ToolContext};

/// Fixed nudge appended after every tool round.
const REFLECT_NUDGE: &str = "Reflect on the results and decide next steps.";

/// Reply used when the model never produced text within the bound.
const NO_RESPONSE: &str = "(no response)";

/// Outcome of one full turn.
pub struct TurnResult {
    pub reply: String,
    pub tools_used: Vec<String>,
}

/// Drive the model until it answers without tool calls or the iteration
/// bound is hit. Tool failures become `"error: ..."` tool results; only
/// infrastructure errors (unknown/disabled tools) and LLM transport
/// errors abort the turn.
pub async fn run_turn(
    llm: &ChatClient,
    registry: &Registry,
    tctx: &ToolContext,
    mut messages: Vec<ChatMessage>,
    max_iters: usize,
) -> Result<TurnResult, NightjarError> {
    let tools = registry.definitions();
    let mut tools_used = Vec::new();
    let mut reply = String::new();

    for iter in 0..max_iters.max(1) {
        let response = llm.chat(&messages, &tools).await?;

        if !response.has_tool_calls() {
            reply = response.content;
            break;
        }

        debug!(iter, calls = response.tool_calls.len(), "executing tool round");
        let mut results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            tools_used.push(call.name.clone());
            let output = match registry.execute(tctx, &call.name, call.arguments.clone()).await {
                Ok(output) => output,
                Err(e @ (NightjarError::UnknownTool(_) | NightjarError::ToolDisabled(_))) => {
                    return Err(e);
                }
                Err(NightjarError::Canceled) => return Err(NightjarError::Canceled),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "tool failed");
                    format!("error: {e}")
                }
            };
            results.push(output);
        }
        append_tool_round(&mut messages, &response.content, &response.tool_calls, &results);
    }

    if reply.trim().is_empty() {
        reply = NO_RESPONSE.to_string();
    }
    Ok(TurnResult { reply, tools_used })
}

/// Append one assistant tool round: the assistant message carrying the
/// calls, one tool-result message per call, then the reflection nudge.
pub fn append_tool_round(
    messages: &mut Vec<ChatMessage>,
    assistant_content: &str,
    tool_calls: &[ToolCall],
    results: &[String],
) {
    if tool_calls.is_empty() {
        return;
    }
    messages.push(ChatMessage {
        role: "assistant".into(),
        content: assistant_content.to_string(),
        tool_calls: tool_calls.to_vec(),
        ..Default::default()
    });
    for (call, result) in tool_calls.iter().zip(results) {
        messages.push(ChatMessage::tool_result(&call.id, &call.name, result));
    }
    messages.push(ChatMessage::text("user", REFLECT_NUDGE));
}
