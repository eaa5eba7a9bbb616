// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram adapter (Bot API via teloxide long polling).
//!
//! Direct messages only. The allow-list is matched against the sender's
//! numeric user id, compounded with the username when present so either
//! form works in `allowFrom`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatKind, Recipient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use nightjar_config::model::TelegramConfig;
use nightjar_core::{Bus, Delivery, InboundMessage, NightjarError, OutboundMessage};

use crate::{AllowList, Channel};

/// How long an adapter may block on a full inbound queue before dropping
/// the transport event.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TelegramChannel {
    bot: Bot,
    allow_list: AllowList,
    bus: Arc<Bus>,
    running: AtomicBool,
    stop_token: std::sync::Mutex<Option<CancellationToken>>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, bus: Arc<Bus>) -> Result<Self, NightjarError> {
        let token = config.token.trim();
        if token.is_empty() {
            return Err(NightjarError::Config(
                "channels.telegram.token is required when telegram is enabled".into(),
            ));
        }
        Ok(TelegramChannel {
            bot: Bot::new(token),
            allow_list: AllowList::new(config.allow_from.clone()),
            bus,
            running: AtomicBool::new(false),
            stop_token: std::sync::Mutex::new(None),
        })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self, cancel: CancellationToken) -> Result<(), NightjarError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let stop = cancel.child_token();
        *self.stop_token.lock().unwrap() = Some(stop.clone());

        let bot = self.bot.clone();
        let bus = Arc::clone(&self.bus);
        let allow_list = self.allow_list.clone();
        let publish_cancel = stop.clone();

        let handler = Update::filter_message().endpoint(move |msg: Message| {
            let bus = Arc::clone(&bus);
            let allow_list = allow_list.clone();
            let cancel = publish_cancel.clone();
            async move {
                if let Some(inbound) = accept_message(&msg, &allow_list) {
                    let publish = bus.publish_inbound(&cancel, inbound);
                    match tokio::time::timeout(PUBLISH_TIMEOUT, publish).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => debug!("inbound publish canceled"),
                        Err(_) => {
                            warn!(chat_id = msg.chat.id.0, "inbound queue full, dropping message")
                        }
                    }
                }
                respond(())
            }
        });

        info!("starting telegram long polling");
        let mut dispatcher = Dispatcher::builder(bot, handler)
            .default_handler(|_| async {})
            .build();
        let shutdown = dispatcher.shutdown_token();

        let dispatch = dispatcher.dispatch();
        tokio::pin!(dispatch);
        tokio::select! {
            _ = &mut dispatch => {}
            _ = stop.cancelled() => {
                if let Ok(fut) = shutdown.shutdown() {
                    fut.await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("telegram polling stopped");
        Ok(())
    }

    async fn stop(&self) {
        if let Some(token) = self.stop_token.lock().unwrap().take() {
            token.cancel();
        }
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), NightjarError> {
        if !self.is_running() {
            return Err(NightjarError::channel_msg("telegram not connected"));
        }
        let chat_id: i64 = msg
            .chat_id
            .trim()
            .parse()
            .map_err(|_| NightjarError::channel_msg(format!("invalid chat_id: {}", msg.chat_id)))?;
        self.bot
            .send_message(Recipient::Id(ChatId(chat_id)), &msg.content)
            .await
            .map_err(|e| NightjarError::Channel {
                message: format!("telegram send failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Gate and convert one Telegram message. Returns `None` for non-DM
/// chats, disallowed senders, and non-text messages.
fn accept_message(msg: &Message, allow_list: &AllowList) -> Option<InboundMessage> {
    if !matches!(msg.chat.kind, ChatKind::Private(_)) {
        debug!(chat_id = msg.chat.id.0, "ignoring non-DM message");
        return None;
    }
    let user = msg.from.as_ref()?;
    let sender_id = match &user.username {
        Some(username) => format!("{}|{username}", user.id.0),
        None => user.id.0.to_string(),
    };
    if !allow_list.allowed(&sender_id) {
        debug!(chat_id = msg.chat.id.0, "ignoring disallowed sender");
        return None;
    }
    let text = msg.text()?;
    Some(InboundMessage {
        channel: "telegram".into(),
        sender_id,
        chat_id: msg.chat.id.0.to_string(),
        content: text.to_string(),
        session_key: None,
        delivery: Some(Delivery {
            message_id: Some(msg.id.0.to_string()),
            reply_to_id: msg.reply_to_message().map(|m| m.id.0.to_string()),
            direct: true,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a Telegram message from Bot API JSON.
    fn make_message(chat_type: &str, user_id: u64, username: Option<&str>, text: &str) -> Message {
        let mut from = serde_json::json!({
            "id": user_id,
            "is_bot": false,
            "first_name": "Test",
        });
        if let Some(name) = username {
            from["username"] = serde_json::json!(name);
        }
        let mut chat = serde_json::json!({
            "id": user_id as i64,
            "type": chat_type,
        });
        if chat_type == "private" {
            chat["first_name"] = serde_json::json!("Test");
        } else {
            chat["title"] = serde_json::json!("Group");
        }
        serde_json::from_value(serde_json::json!({
            "message_id": 11,
            "date": 1700000000i64,
            "chat": chat,
            "from": from,
            "text": text,
        }))
        .expect("mock telegram message")
    }

    #[test]
    fn dm_from_allowed_user_id_is_accepted() {
        let msg = make_message("private", 42, None, "hello");
        let inbound = accept_message(&msg, &AllowList::new(vec!["42".into()])).unwrap();
        assert_eq!(inbound.channel, "telegram");
        assert_eq!(inbound.chat_id, "42");
        assert_eq!(inbound.content, "hello");
        assert!(inbound.delivery.as_ref().unwrap().direct);
    }

    #[test]
    fn username_matches_via_compound_id() {
        let msg = make_message("private", 42, Some("alice"), "hi");
        assert!(accept_message(&msg, &AllowList::new(vec!["alice".into()])).is_some());
        assert_eq!(
            accept_message(&msg, &AllowList::new(vec!["alice".into()]))
                .unwrap()
                .sender_id,
            "42|alice"
        );
    }

    #[test]
    fn disallowed_sender_produces_nothing() {
        let msg = make_message("private", 42, Some("mallory"), "let me in");
        assert!(accept_message(&msg, &AllowList::new(vec!["alice".into()])).is_none());
    }

    #[test]
    fn group_messages_are_ignored() {
        let msg = make_message("supergroup", 42, Some("alice"), "hello group");
        assert!(accept_message(&msg, &AllowList::new(vec![])).is_none());
    }

    #[test]
    fn empty_allow_list_accepts_any_dm() {
        let msg = make_message("private", 7, None, "open door");
        assert!(accept_message(&msg, &AllowList::default()).is_some());
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let cfg = TelegramConfig::default();
        let bus = Arc::new(Bus::default());
        assert!(TelegramChannel::new(&cfg, bus).is_err());
    }
}
