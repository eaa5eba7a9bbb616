// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The agent turn loop.
//!
//! Consumes inbound messages, resolves sessions, runs the tool loop, and
//! publishes replies. Messages on the reserved `system` channel carry
//! their origin in `chat_id` and are processed in the origin session so
//! the reply lands in the originating chat.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use nightjar_config::Config;
use nightjar_core::{parse_origin, Bus, InboundMessage, NightjarError, OutboundMessage, SYSTEM_CHANNEL};
use nightjar_llm::{ChatClient, ChatMessage};
use nightjar_memory::SearchManager;
use nightjar_tools::{Registry, SpawnFn, ToolContext};

use crate::consolidation::{maybe_consolidate, summarize_with_llm};
use crate::prompt::build_system_prompt;
use crate::session::SessionManager;
use crate::skills::SkillLoader;
use crate::turn::run_turn;

pub struct AgentLoopOptions {
    pub config: Arc<Config>,
    pub workspace: PathBuf,
    pub max_iters: usize,
    pub bus: Arc<Bus>,
    pub sessions: Arc<SessionManager>,
    pub skills: Option<Arc<SkillLoader>>,
    pub cron: Option<Arc<nightjar_cron::Service>>,
    pub memory: Option<Arc<dyn SearchManager>>,
    pub cancel: CancellationToken,
}

pub struct AgentLoop {
    cfg: Arc<Config>,
    workspace: PathBuf,
    max_iters: usize,
    memory_window: usize,
    bus: Arc<Bus>,
    sessions: Arc<SessionManager>,
    skills: Arc<SkillLoader>,
    llm: Arc<ChatClient>,
    registry: RwLock<Registry>,
    consolidating: Arc<Mutex<HashSet<String>>>,
    cancel: CancellationToken,
}

impl AgentLoop {
    pub fn new(opts: AgentLoopOptions) -> Result<Arc<Self>, NightjarError> {
        if opts.workspace.as_os_str().is_empty() {
            return Err(NightjarError::Config("workspace is empty".into()));
        }
        let workspace = opts
            .workspace
            .canonicalize()
            .unwrap_or_else(|_| opts.workspace.clone());
        let max_iters = if opts.max_iters == 0 { 20 } else { opts.max_iters };
        let cfg = opts.config;
        let memory_window = cfg.agents.defaults.memory_window_value();

        let llm = Arc::new(ChatClient::new(
            cfg.llm.provider.clone(),
            cfg.llm.base_url.clone(),
            cfg.llm.api_key.clone(),
            cfg.llm.model.clone(),
            cfg.agents.defaults.max_tokens_value(),
            Some(cfg.agents.defaults.temperature_value()),
            cfg.llm.headers.clone(),
        )?);

        let skills = opts
            .skills
            .unwrap_or_else(|| Arc::new(SkillLoader::new(&workspace)));

        let mut registry = Registry::new(&workspace);
        registry.restrict_to_workspace = cfg.tools.restrict_to_workspace_value();
        registry.exec_timeout = std::time::Duration::from_secs(cfg.tools.exec.timeout_sec_value());
        registry.brave_api_key = cfg.tools.web.brave_api_key.clone();
        registry.cron = opts.cron;
        registry.memory = opts.memory;
        {
            let skills = Arc::clone(&skills);
            registry.read_skill = Some(Arc::new(move |name: &str| skills.load(name)));
        }
        {
            let bus = Arc::clone(&opts.bus);
            let cancel = opts.cancel.clone();
            registry.outbound = Some(Arc::new(move |msg: OutboundMessage| {
                let bus = Arc::clone(&bus);
                let cancel = cancel.clone();
                Box::pin(async move { bus.publish_outbound(&cancel, msg).await })
            }));
        }

        Ok(Arc::new(AgentLoop {
            cfg,
            workspace,
            max_iters,
            memory_window,
            bus: opts.bus,
            sessions: opts.sessions,
            skills,
            llm,
            registry: RwLock::new(registry),
            consolidating: Arc::new(Mutex::new(HashSet::new())),
            cancel: opts.cancel,
        }))
    }

    /// Install the subagent spawner (wired after construction to close
    /// the loop/manager cycle).
    pub async fn set_spawn(&self, spawn: SpawnFn) {
        self.registry.write().await.spawn = Some(spawn);
    }

    pub fn llm(&self) -> Arc<ChatClient> {
        Arc::clone(&self.llm)
    }

    pub fn bus(&self) -> Arc<Bus> {
        Arc::clone(&self.bus)
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.cfg)
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Consume inbound messages until shutdown.
    pub async fn run(&self) -> Result<(), NightjarError> {
        loop {
            let msg = match self.bus.consume_inbound(&self.cancel).await {
                Ok(msg) => msg,
                Err(NightjarError::Canceled) => return Ok(()),
                Err(e) => return Err(e),
            };
            let (reply, mut outbound) = self.process_inbound(msg).await;
            match reply {
                Ok(text) => {
                    if !outbound.channel.is_empty()
                        && !outbound.chat_id.is_empty()
                        && !text.trim().is_empty()
                    {
                        outbound.content = text;
                        let _ = self.bus.publish_outbound(&self.cancel, outbound).await;
                    }
                }
                Err(NightjarError::Canceled) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "turn failed");
                    // Best-effort error reply.
                    if !outbound.channel.is_empty() && !outbound.chat_id.is_empty() {
                        outbound.content = format!("error: {e}");
                        let _ = self.bus.publish_outbound(&self.cancel, outbound).await;
                    }
                }
            }
        }
    }

    /// Resolve routing for one inbound message and process it. Returns
    /// the turn result plus the outbound envelope (content unset).
    pub async fn process_inbound(
        &self,
        msg: InboundMessage,
    ) -> (Result<String, NightjarError>, OutboundMessage) {
        if msg.channel == SYSTEM_CHANNEL {
            // Subagents, cron, and heartbeats announce with the origin
            // encoded in chat_id; replies route back there.
            let (origin_channel, origin_chat) = match parse_origin(&msg.chat_id) {
                Some((ch, chat)) => (ch.to_string(), chat.to_string()),
                None => ("cli".to_string(), msg.chat_id.clone()),
            };
            let session_key = format!("{origin_channel}:{origin_chat}");
            let reply = self
                .process_direct(&msg.content, &session_key, &origin_channel, &origin_chat)
                .await;
            let outbound = OutboundMessage {
                channel: origin_channel,
                chat_id: origin_chat,
                content: String::new(),
                reply_to: None,
                delivery: None,
            };
            return (reply, outbound);
        }

        let session_key = msg.effective_session_key();
        let reply = self
            .process_direct(&msg.content, &session_key, &msg.channel, &msg.chat_id)
            .await;
        let outbound = OutboundMessage {
            channel: msg.channel,
            chat_id: msg.chat_id,
            content: String::new(),
            reply_to: msg.delivery.as_ref().and_then(|d| d.message_id.clone()),
            delivery: msg.delivery,
        };
        (reply, outbound)
    }

    /// One full turn in the named session.
    pub async fn process_direct(
        &self,
        content: &str,
        session_key: &str,
        channel: &str,
        chat_id: &str,
    ) -> Result<String, NightjarError> {
        let handle = self.sessions.get_or_create(session_key).await?;

        let system =
            build_system_prompt(&self.cfg, &self.workspace, channel, chat_id, Some(self.skills.as_ref()));
        let mut messages: Vec<ChatMessage> = Vec::new();
        messages.push(ChatMessage::text("system", system));
        {
            let session = handle.lock().await;
            for msg in session.history(self.memory_window) {
                messages.push(ChatMessage::text(msg.role.clone(), msg.content.clone()));
            }
        }
        messages.push(ChatMessage::text("user", content));

        let tctx = ToolContext {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            session_key: session_key.to_string(),
        };
        let result = {
            let registry = self.registry.read().await;
            run_turn(&self.llm, &registry, &tctx, messages, self.max_iters).await?
        };

        {
            let mut session = handle.lock().await;
            session.add("user", content);
            session.add_with_tools("assistant", result.reply.clone(), result.tools_used);
            self.sessions.save(&session)?;
        }

        self.schedule_consolidation(session_key).await;
        Ok(result.reply)
    }

    /// Kick off at most one background consolidation per session.
    async fn schedule_consolidation(&self, session_key: &str) {
        let handle = match self.sessions.get_or_create(session_key).await {
            Ok(handle) => handle,
            Err(_) => return,
        };
        {
            let session = handle.lock().await;
            if !session.needs_consolidation(self.memory_window) {
                return;
            }
        }
        {
            let mut in_flight = self.consolidating.lock().await;
            if !in_flight.insert(session_key.to_string()) {
                return;
            }
        }

        let key = session_key.to_string();
        let sessions = Arc::clone(&self.sessions);
        let llm = Arc::clone(&self.llm);
        let consolidating = Arc::clone(&self.consolidating);
        let window = self.memory_window;
        tokio::spawn(async move {
            let result = async {
                let handle = sessions.get_or_create(&key).await?;
                let mut session = handle.lock().await;
                let llm = Arc::clone(&llm);
                let changed = maybe_consolidate(&mut session, window, move |current, conversation| {
                    let llm = Arc::clone(&llm);
                    async move { summarize_with_llm(&llm, current, conversation).await }
                })
                .await?;
                if changed {
                    sessions.save(&session)?;
                }
                Ok::<_, NightjarError>(changed)
            }
            .await;
            match result {
                Ok(changed) => debug!(session = %key, changed, "consolidation finished"),
                Err(e) => warn!(session = %key, error = %e, "consolidation failed"),
            }
            consolidating.lock().await.remove(&key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nightjar_core::Delivery;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn loop_with_stub(
        server: &MockServer,
        ws: &Path,
        sessions_dir: &Path,
    ) -> Arc<AgentLoop> {
        let mut cfg = Config::default();
        cfg.agents.defaults.model = "openai/gpt-4o-mini".into();
        cfg.llm.provider = "openai".into();
        cfg.llm.base_url = server.uri();
        cfg.llm.model = "gpt-4o-mini".into();

        AgentLoop::new(AgentLoopOptions {
            config: Arc::new(cfg),
            workspace: ws.to_path_buf(),
            max_iters: 20,
            bus: Arc::new(Bus::default()),
            sessions: SessionManager::new(sessions_dir),
            skills: None,
            cron: None,
            memory: None,
            cancel: CancellationToken::new(),
        })
        .unwrap()
    }

    fn text_reply(content: &str) -> serde_json::Value {
        serde_json::json!({"choices": [{"message": {"content": content}}]})
    }

    #[tokio::test]
    async fn single_turn_replies_and_persists_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("4")))
            .mount(&server)
            .await;

        let ws = tempfile::tempdir().unwrap();
        let sessions_dir = tempfile::tempdir().unwrap();
        let agent = loop_with_stub(&server, ws.path(), sessions_dir.path());

        let reply = agent
            .process_direct("What is 2+2?", "cli:default", "cli", "direct")
            .await
            .unwrap();
        assert_eq!(reply, "4");

        let stored = SessionManager::new(sessions_dir.path())
            .load("cli:default")
            .unwrap()
            .unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0].role, "user");
        assert_eq!(stored.messages[0].content, "What is 2+2?");
        assert_eq!(stored.messages[1].role, "assistant");
        assert_eq!(stored.messages[1].content, "4");
    }

    #[tokio::test]
    async fn tool_round_executes_and_feeds_back() {
        let server = MockServer::start().await;
        // First call requests a tool; second call answers.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"path\":\"fact.txt\"}"}
                    }]
                }}]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("the fact is blue")))
            .mount(&server)
            .await;

        let ws = tempfile::tempdir().unwrap();
        std::fs::write(ws.path().join("fact.txt"), "blue").unwrap();
        let sessions_dir = tempfile::tempdir().unwrap();
        let agent = loop_with_stub(&server, ws.path(), sessions_dir.path());

        let reply = agent
            .process_direct("what color?", "cli:default", "cli", "direct")
            .await
            .unwrap();
        assert_eq!(reply, "the fact is blue");

        let stored = SessionManager::new(sessions_dir.path())
            .load("cli:default")
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.messages[1].tools_used,
            Some(vec!["read_file".to_string()])
        );
    }

    #[tokio::test]
    async fn system_channel_routes_to_origin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("summarized")))
            .mount(&server)
            .await;

        let ws = tempfile::tempdir().unwrap();
        let sessions_dir = tempfile::tempdir().unwrap();
        let agent = loop_with_stub(&server, ws.path(), sessions_dir.path());

        let (reply, outbound) = agent
            .process_inbound(InboundMessage {
                channel: SYSTEM_CHANNEL.into(),
                sender_id: "sa_1".into(),
                chat_id: "telegram:42".into(),
                content: "[Background task 'x' completed] ...".into(),
                session_key: None,
                delivery: None,
            })
            .await;
        assert_eq!(reply.unwrap(), "summarized");
        assert_eq!(outbound.channel, "telegram");
        assert_eq!(outbound.chat_id, "42");

        // The turn landed in the origin session.
        let stored = SessionManager::new(sessions_dir.path())
            .load("telegram:42")
            .unwrap()
            .unwrap();
        assert_eq!(stored.messages.len(), 2);
    }

    #[tokio::test]
    async fn inbound_delivery_threads_the_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("ok")))
            .mount(&server)
            .await;

        let ws = tempfile::tempdir().unwrap();
        let sessions_dir = tempfile::tempdir().unwrap();
        let agent = loop_with_stub(&server, ws.path(), sessions_dir.path());

        let (_, outbound) = agent
            .process_inbound(InboundMessage {
                channel: "telegram".into(),
                sender_id: "42".into(),
                chat_id: "42".into(),
                content: "hi".into(),
                session_key: None,
                delivery: Some(Delivery {
                    message_id: Some("m9".into()),
                    reply_to_id: None,
                    direct: true,
                }),
            })
            .await;
        assert_eq!(outbound.reply_to.as_deref(), Some("m9"));
    }

    #[tokio::test]
    async fn llm_failure_surfaces_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let ws = tempfile::tempdir().unwrap();
        let sessions_dir = tempfile::tempdir().unwrap();
        let agent = loop_with_stub(&server, ws.path(), sessions_dir.path());

        let err = agent
            .process_direct("hello", "cli:default", "cli", "direct")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("llm http 500"));
    }
}
