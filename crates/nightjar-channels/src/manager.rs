// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The channel registry and outbound dispatcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nightjar_core::Bus;

use crate::Channel;

/// Registry of channels keyed by name.
///
/// `start_all` launches one task per channel for its receive loop and one
/// dispatcher task that drains the outbound queue, handing each message to
/// the named adapter. Messages for unregistered channels are dropped with
/// a warning; the bus itself never drops.
pub struct ChannelManager {
    bus: Arc<Bus>,
    channels: HashMap<String, Arc<dyn Channel>>,
    running: AtomicBool,
}

impl ChannelManager {
    pub fn new(bus: Arc<Bus>) -> Self {
        ChannelManager {
            bus,
            channels: HashMap::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Register a channel under its own name. Later registrations with
    /// the same name replace earlier ones.
    pub fn add(&mut self, channel: Arc<dyn Channel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Per-channel running state.
    pub fn status(&self) -> Vec<(String, bool)> {
        let mut out: Vec<(String, bool)> = self
            .channels
            .iter()
            .map(|(name, ch)| (name.clone(), ch.is_running()))
            .collect();
        out.sort();
        out
    }

    /// Start every channel and the outbound dispatcher. Idempotent.
    ///
    /// A channel whose `start` fails logs the error without affecting the
    /// other channels.
    pub fn start_all(&self, cancel: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        for channel in self.channels.values() {
            let channel = Arc::clone(channel);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let name = channel.name().to_string();
                info!(channel = %name, "channel starting");
                if let Err(e) = channel.start(cancel).await {
                    warn!(channel = %name, error = %e, "channel stopped with error");
                }
            });
        }

        let bus = Arc::clone(&self.bus);
        let channels = self.channels.clone();
        tokio::spawn(async move {
            dispatch_outbound(bus, channels, cancel).await;
        });
    }

    /// Stop every channel. Idempotent.
    pub async fn stop_all(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for channel in self.channels.values() {
            channel.stop().await;
        }
    }
}

async fn dispatch_outbound(
    bus: Arc<Bus>,
    channels: HashMap<String, Arc<dyn Channel>>,
    cancel: CancellationToken,
) {
    loop {
        let msg = match bus.consume_outbound(&cancel).await {
            Ok(msg) => msg,
            Err(_) => return,
        };
        let Some(channel) = channels.get(&msg.channel) else {
            warn!(channel = %msg.channel, "dropping outbound message for unknown channel");
            continue;
        };
        if let Err(e) = channel.send(&msg).await {
            warn!(channel = %msg.channel, chat_id = %msg.chat_id, error = %e, "outbound send failed");
        }
    }
}
