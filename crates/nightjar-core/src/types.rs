// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport-agnostic message types flowing through the bus.

use serde::{Deserialize, Serialize};

/// Reserved channel name for intra-process producers (subagent
/// announcements, cron fires, heartbeats). Messages on this channel carry
/// `"<origin_channel>:<origin_chat_id>"` in `chat_id` so replies can be
/// routed back to the originating conversation.
pub const SYSTEM_CHANNEL: &str = "system";

/// Optional transport-level delivery metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Transport message id of the inbound event, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Message id this event replied to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    /// Whether the event arrived as a direct message.
    #[serde(default)]
    pub direct: bool,
}

/// An event received from a transport (or an internal producer) headed
/// for the agent loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Origin transport name, or [`SYSTEM_CHANNEL`].
    pub channel: String,
    /// Stable per-transport caller id.
    pub sender_id: String,
    /// Stable per-transport conversation id.
    pub chat_id: String,
    /// User text.
    pub content: String,
    /// Session key override. When absent the session key is
    /// `"<channel>:<chat_id>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
}

impl InboundMessage {
    /// Resolve the effective session key for this message.
    pub fn effective_session_key(&self) -> String {
        match &self.session_key {
            Some(key) if !key.trim().is_empty() => key.clone(),
            _ => format!("{}:{}", self.channel, self.chat_id),
        }
    }
}

/// A reply headed for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Destination transport name.
    pub channel: String,
    /// Destination conversation id.
    pub chat_id: String,
    /// Reply text.
    pub content: String,
    /// Threading hint: message id to reply to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
}

/// Split a `system`-channel `chat_id` of the form
/// `"<origin_channel>:<origin_chat_id>"` into its components.
///
/// Returns `None` when the id has no `:` separator.
pub fn parse_origin(chat_id: &str) -> Option<(&str, &str)> {
    chat_id.split_once(':').filter(|(ch, id)| !ch.is_empty() && !id.is_empty())
}
