// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session consolidation.
//!
//! When a session reaches the memory window, everything older than the
//! retained tail is summarized into one assistant-role note carrying a
//! stable prefix, and the session is rewritten as `[note] ++ tail`. The
//! summary also folds in the previous summary so context accumulates.

use std::future::Future;

use tracing::debug;

use nightjar_core::NightjarError;
use nightjar_llm::{ChatClient, ChatMessage};

use crate::session::{Session, SessionMessage};

/// Stable tag prefixing the summary note.
pub const SUMMARY_PREFIX: &str = "[Conversation summary]";

/// Messages kept verbatim: `memory_window - TAIL_MARGIN`, floored.
const TAIL_MARGIN: usize = 20;
const MIN_TAIL: usize = 4;

/// Fold the oldest prefix of `session` into a summary note when the
/// window is reached. Returns whether the session changed.
///
/// `summarize` maps `(current_summary, conversation)` to the new summary.
pub async fn maybe_consolidate<F, Fut>(
    session: &mut Session,
    memory_window: usize,
    summarize: F,
) -> Result<bool, NightjarError>
where
    F: FnOnce(String, String) -> Fut,
    Fut: Future<Output = Result<String, NightjarError>>,
{
    if !session.needs_consolidation(memory_window) {
        return Ok(false);
    }

    let keep = memory_window.saturating_sub(TAIL_MARGIN).max(MIN_TAIL);
    if session.messages.len() <= keep {
        return Ok(false);
    }
    let split = session.messages.len() - keep;
    let old = &session.messages[..split];

    let conversation = render_conversation(old);
    let current = session
        .summary
        .clone()
        .unwrap_or_default();
    let new_summary = summarize(current, conversation).await?;
    let new_summary = new_summary.trim().to_string();
    if new_summary.is_empty() {
        return Ok(false);
    }

    debug!(
        session = %session.key,
        summarized = split,
        retained = keep,
        "session consolidated"
    );

    let mut rewritten = Vec::with_capacity(keep + 1);
    rewritten.push(SessionMessage {
        role: "assistant".into(),
        content: format!("{SUMMARY_PREFIX} {new_summary}"),
        tools_used: None,
        ts: chrono::Utc::now().timestamp_millis(),
    });
    rewritten.extend_from_slice(&session.messages[split..]);

    session.last_consolidated_index += split;
    session.summary = Some(new_summary);
    session.messages = rewritten;
    Ok(true)
}

fn render_conversation(messages: &[SessionMessage]) -> String {
    let mut out = String::new();
    for msg in messages {
        out.push_str(&format!("{}: {}\n", msg.role, msg.content));
    }
    out
}

/// Summarize with the configured LLM.
pub async fn summarize_with_llm(
    llm: &ChatClient,
    current_summary: String,
    conversation: String,
) -> Result<String, NightjarError> {
    let system = "You maintain a running summary of a long conversation. \
                  Merge the existing summary with the new conversation excerpt into a single \
                  concise summary (under 200 words). Keep decisions, facts, names, and open \
                  tasks; drop pleasantries.";
    let user = format!(
        "Existing summary:\n{}\n\nNew conversation excerpt:\n{}\n\nReply with only the merged summary.",
        if current_summary.trim().is_empty() {
            "(none)"
        } else {
            current_summary.trim()
        },
        conversation.trim()
    );
    let response = llm
        .chat(
            &[
                ChatMessage::text("system", system),
                ChatMessage::text("user", user),
            ],
            &[],
        )
        .await?;
    Ok(response.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_session(n: usize) -> Session {
        let mut session = Session::new("cli:test");
        for i in 0..n {
            session.add(if i % 2 == 0 { "user" } else { "assistant" }, format!("msg {i}"));
        }
        session
    }

    async fn fixed(result: &str, _current: String, _conversation: String) -> Result<String, NightjarError> {
        Ok(result.to_string())
    }

    #[tokio::test]
    async fn below_window_is_untouched() {
        let mut session = filled_session(10);
        let changed = maybe_consolidate(&mut session, 50, |c, v| fixed("unused", c, v))
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(session.messages.len(), 10);
        assert!(session.summary.is_none());
    }

    #[tokio::test]
    async fn window_reached_rewrites_with_summary_note() {
        let mut session = filled_session(50);
        let changed =
            maybe_consolidate(&mut session, 50, |c, v| fixed("they discussed fifty things", c, v))
                .await
                .unwrap();
        assert!(changed);

        // Tail of 30 retained plus the summary note.
        assert_eq!(session.messages.len(), 31);
        assert!(session.messages[0].content.starts_with(SUMMARY_PREFIX));
        assert_eq!(session.messages[0].role, "assistant");
        assert_eq!(session.messages[1].content, "msg 20");
        assert_eq!(session.messages.last().unwrap().content, "msg 49");
        assert_eq!(session.summary.as_deref(), Some("they discussed fifty things"));
        assert_eq!(session.last_consolidated_index, 20);
    }

    #[tokio::test]
    async fn summarizer_sees_previous_summary_and_old_messages() {
        let mut session = filled_session(50);
        session.summary = Some("earlier context".into());

        let seen: std::sync::Arc<std::sync::Mutex<(String, String)>> = Default::default();
        let seen_clone = std::sync::Arc::clone(&seen);

        maybe_consolidate(&mut session, 50, move |current, conversation| {
            let seen = std::sync::Arc::clone(&seen_clone);
            async move {
                *seen.lock().unwrap() = (current, conversation);
                Ok("merged".to_string())
            }
        })
        .await
        .unwrap();
        let (current, conversation) = seen.lock().unwrap().clone();
        assert_eq!(current, "earlier context");
        assert!(conversation.contains("user: msg 0"));
        assert!(conversation.contains("msg 19"));
        assert!(!conversation.contains("msg 20"), "tail must not be summarized");
    }

    #[tokio::test]
    async fn empty_summary_aborts_rewrite() {
        let mut session = filled_session(50);
        let changed = maybe_consolidate(&mut session, 50, |c, v| fixed("   ", c, v))
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(session.messages.len(), 50);
    }

    #[tokio::test]
    async fn small_windows_keep_a_minimum_tail() {
        let mut session = filled_session(10);
        let changed = maybe_consolidate(&mut session, 10, |c, v| fixed("tiny", c, v))
            .await
            .unwrap();
        assert!(changed);
        // MIN_TAIL retained plus the note.
        assert_eq!(session.messages.len(), MIN_TAIL + 1);
    }

    #[tokio::test]
    async fn consecutive_consolidations_accumulate_index() {
        let mut session = filled_session(50);
        maybe_consolidate(&mut session, 50, |c, v| fixed("first", c, v))
            .await
            .unwrap();
        let after_first = session.last_consolidated_index;

        for i in 0..30 {
            session.add("user", format!("later {i}"));
        }
        maybe_consolidate(&mut session, 50, |c, v| fixed("second", c, v))
            .await
            .unwrap();
        assert!(session.last_consolidated_index > after_first);
        assert_eq!(session.summary.as_deref(), Some("second"));
    }
}
