// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat transport adapters.
//!
//! Each transport implements the [`Channel`] trait: it owns its
//! connection, applies its [`AllowList`] to inbound events, and publishes
//! accepted events to the bus. The [`ChannelManager`] starts one task per
//! channel plus an outbound dispatcher draining the bus toward the named
//! adapter. The Telegram adapter ships in-tree; other transports plug in
//! through the same trait.

pub mod manager;
pub mod telegram;

use async_trait::async_trait;

use nightjar_core::{NightjarError, OutboundMessage};
use tokio_util::sync::CancellationToken;

pub use manager::ChannelManager;
pub use telegram::TelegramChannel;

/// A chat transport adapter.
///
/// `start` runs the transport's receive loop until it fails or the token
/// cancels; the manager spawns it on its own task. `send` must fail with a
/// "not connected" channel error when the transport is not running.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable transport name used for routing (`"telegram"`, ...).
    fn name(&self) -> &str;

    /// Connect and pump inbound events until cancellation.
    async fn start(&self, cancel: CancellationToken) -> Result<(), NightjarError>;

    /// Disconnect. Idempotent.
    async fn stop(&self);

    /// Deliver one outbound message.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), NightjarError>;

    /// Whether the transport is currently connected.
    fn is_running(&self) -> bool;
}

/// Caller-ID gate applied by every adapter before publishing inbound.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    pub allow_from: Vec<String>,
}

impl AllowList {
    pub fn new(allow_from: Vec<String>) -> Self {
        AllowList { allow_from }
    }

    /// Empty list allows everyone. Otherwise the sender ID must match
    /// exactly, with one concession: compound IDs of the form `"a|b|c"`
    /// are split on `|` and any matching component grants access.
    pub fn allowed(&self, sender_id: &str) -> bool {
        if self.allow_from.is_empty() {
            return true;
        }
        let sender_id = sender_id.trim();
        if sender_id.is_empty() {
            return false;
        }
        if self.allow_from.iter().any(|a| a == sender_id) {
            return true;
        }
        if sender_id.contains('|') {
            for part in sender_id.split('|') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                if self.allow_from.iter().any(|a| a == part) {
                    return true;
                }
            }
        }
        false
    }
}
