// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic workspace self-prompt.
//!
//! On each tick the service reads `<workspace>/HEARTBEAT.md`; when the
//! file carries real content (not just headings, comments, or empty task
//! checkboxes) it dispatches a fixed prompt through the agent. Replies
//! matching the OK token are dropped; anything else is logged truncated.
//! At most one heartbeat runs at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nightjar_core::NightjarError;

/// Fixed prompt dispatched on each active tick.
pub const HEARTBEAT_PROMPT: &str = "Read HEARTBEAT.md in your workspace (if it exists).\n\
Follow any instructions or tasks listed there.\n\
If nothing needs attention, reply with just: HEARTBEAT_OK";

/// Reply token meaning "nothing to report".
pub const OK_TOKEN: &str = "HEARTBEAT_OK";

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Handler invoked with the heartbeat prompt; returns the agent reply.
pub type OnBeat =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<String, NightjarError>> + Send + Sync>;

pub struct HeartbeatService {
    workspace: PathBuf,
    enabled: bool,
    interval: Duration,
    on_beat: OnBeat,
    in_flight: Arc<AtomicBool>,
}

impl HeartbeatService {
    pub fn new(
        workspace: impl Into<PathBuf>,
        enabled: bool,
        interval: Duration,
        on_beat: OnBeat,
    ) -> Arc<Self> {
        Arc::new(HeartbeatService {
            workspace: workspace.into(),
            enabled,
            interval: if interval.is_zero() {
                DEFAULT_INTERVAL
            } else {
                interval
            },
            on_beat,
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start the ticker task. A disabled service is a no-op.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) {
        if !self.enabled {
            return;
        }
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // the first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => service.tick().await,
                }
            }
        });
    }

    /// Run one heartbeat regardless of the file check (CLI/testing hook).
    pub async fn trigger_now(&self) -> Result<String, NightjarError> {
        (self.on_beat)(HEARTBEAT_PROMPT.to_string()).await
    }

    async fn tick(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        let _reset = InFlightReset(&self.in_flight);

        let content = std::fs::read_to_string(self.workspace.join("HEARTBEAT.md"))
            .unwrap_or_default();
        if is_empty_heartbeat(&content) {
            return;
        }

        match (self.on_beat)(HEARTBEAT_PROMPT.to_string()).await {
            Ok(reply) => {
                if is_heartbeat_ok(&reply) {
                    return;
                }
                if !reply.trim().is_empty() {
                    info!(reply = %truncate_for_log(&reply, 400), "heartbeat response");
                }
            }
            Err(e) => warn!(error = %e, "heartbeat failed"),
        }
    }
}

struct InFlightReset<'a>(&'a AtomicBool);

impl Drop for InFlightReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A heartbeat file is empty when it holds only blank lines, headings,
/// HTML comments, and untouched/completed task checkboxes.
pub fn is_empty_heartbeat(content: &str) -> bool {
    let content = content.trim();
    if content.is_empty() {
        return true;
    }
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("<!--") {
            continue;
        }
        if matches!(line, "- [ ]" | "* [ ]" | "- [x]" | "* [x]") {
            continue;
        }
        return false;
    }
    true
}

/// Token comparison tolerant to case, whitespace, and punctuation.
pub fn is_heartbeat_ok(reply: &str) -> bool {
    normalize_token(reply).contains(&normalize_token(OK_TOKEN))
}

fn normalize_token(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn truncate_for_log(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &s[..end])
}
