// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background subagents.
//!
//! A spawned subagent runs a restricted tool set (no message, no spawn,
//! no cron) against the same model, capped at a smaller iteration bound.
//! On completion it publishes a synthetic inbound message on the `system`
//! channel whose `chat_id` encodes the originating conversation; the main
//! loop turns that announcement into a natural reply in the origin chat.

use std::sync::Arc;

use tracing::{debug, warn};

use nightjar_core::{InboundMessage, NightjarError, SYSTEM_CHANNEL};
use nightjar_llm::ChatMessage;
use nightjar_tools::{Registry, SpawnFn, SpawnRequest, ToolContext};

use crate::agent_loop::AgentLoop;
use crate::prompt::build_subagent_prompt;
use crate::turn::run_turn;

/// Iteration bound for subagent turns.
const SUBAGENT_MAX_ITERS: usize = 15;

/// Tools available to subagents.
const SUBAGENT_TOOLS: [&str; 6] = [
    "read_file",
    "write_file",
    "list_dir",
    "exec",
    "web_search",
    "web_fetch",
];

pub struct SubagentManager {
    agent: Arc<AgentLoop>,
}

impl SubagentManager {
    pub fn new(agent: Arc<AgentLoop>) -> Arc<Self> {
        Arc::new(SubagentManager { agent })
    }

    /// The spawn callback handed to the tool registry.
    pub fn spawn_fn(self: &Arc<Self>) -> SpawnFn {
        let manager = Arc::clone(self);
        Arc::new(move |req: SpawnRequest| {
            let manager = Arc::clone(&manager);
            Box::pin(async move { manager.spawn(req) })
        })
    }

    /// Launch a subagent task. Returns its id immediately; the result
    /// arrives later via the `system` channel.
    pub fn spawn(&self, req: SpawnRequest) -> Result<String, NightjarError> {
        let task = req.task.trim().to_string();
        if task.is_empty() {
            return Err(NightjarError::Tool("task is empty".into()));
        }
        let id = new_subagent_id();
        debug!(id = %id, "spawning subagent");

        let agent = Arc::clone(&self.agent);
        let label = if req.label.trim().is_empty() {
            short_label(&task)
        } else {
            req.label.trim().to_string()
        };
        let origin_channel = req.origin_channel;
        let origin_chat_id = req.origin_chat_id;
        let announce_id = id.clone();

        tokio::spawn(async move {
            let outcome = run_subagent(&agent, &task).await;
            let output = match outcome {
                Ok(output) => output,
                Err(e) => format!("error: {e}"),
            };
            let announce = format!(
                "[Background task '{label}' completed]\n\n\
                 Task: {task}\n\n\
                 Result:\n{output}\n\n\
                 Summarize this naturally for the user. Keep it brief (1-2 sentences). \
                 Do not mention technical details like \"subagent\" or task IDs."
            );

            let bus = agent.bus();
            let cancel = agent.cancel_token();
            let msg = InboundMessage {
                channel: SYSTEM_CHANNEL.into(),
                sender_id: announce_id,
                chat_id: format!("{origin_channel}:{origin_chat_id}"),
                content: announce,
                session_key: None,
                delivery: None,
            };
            if let Err(e) = bus.publish_inbound(&cancel, msg).await {
                warn!(error = %e, "subagent announcement dropped");
            }
        });

        Ok(id)
    }
}

async fn run_subagent(agent: &AgentLoop, task: &str) -> Result<String, NightjarError> {
    let cfg = agent.config();
    let mut registry = Registry::new(agent.workspace());
    registry.restrict_to_workspace = cfg.tools.restrict_to_workspace_value();
    registry.exec_timeout = std::time::Duration::from_secs(cfg.tools.exec.timeout_sec_value());
    registry.brave_api_key = cfg.tools.web.brave_api_key.clone();
    registry.allow_tools = SUBAGENT_TOOLS.iter().map(|s| s.to_string()).collect();

    let messages = vec![
        ChatMessage::text("system", build_subagent_prompt(agent.workspace(), task)),
        ChatMessage::text("user", task),
    ];
    let tctx = ToolContext {
        channel: "cli".into(),
        chat_id: "subagent".into(),
        session_key: String::new(),
    };

    let llm = agent.llm();
    let result = run_turn(&llm, &registry, &tctx, messages, SUBAGENT_MAX_ITERS).await?;
    Ok(result.reply)
}

fn new_subagent_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("sa_{}", &hex[..16])
}

fn short_label(task: &str) -> String {
    let task = task.trim();
    if task.is_empty() {
        return "task".into();
    }
    if task.chars().count() <= 30 {
        return task.to_string();
    }
    task.chars().take(30).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_loop::AgentLoopOptions;
    use crate::session::SessionManager;
    use nightjar_config::Config;
    use nightjar_core::Bus;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubEnv {
        agent: Arc<AgentLoop>,
        bus: Arc<Bus>,
        cancel: CancellationToken,
        _workspace: tempfile::TempDir,
        _sessions: tempfile::TempDir,
    }

    fn stub_agent(server: &MockServer) -> StubEnv {
        let mut cfg = Config::default();
        cfg.llm.provider = "openai".into();
        cfg.llm.base_url = server.uri();
        cfg.llm.model = "gpt-4o-mini".into();

        let workspace = tempfile::tempdir().unwrap();
        let sessions = tempfile::tempdir().unwrap();
        let bus = Arc::new(Bus::default());
        let cancel = CancellationToken::new();
        let agent = AgentLoop::new(AgentLoopOptions {
            config: Arc::new(cfg),
            workspace: workspace.path().to_path_buf(),
            max_iters: 20,
            bus: Arc::clone(&bus),
            sessions: SessionManager::new(sessions.path()),
            skills: None,
            cron: None,
            memory: None,
            cancel: cancel.clone(),
        })
        .unwrap();
        StubEnv {
            agent,
            bus,
            cancel,
            _workspace: workspace,
            _sessions: sessions,
        }
    }

    #[tokio::test]
    async fn spawn_returns_id_and_announces_on_system_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "found three log errors"}}]
            })))
            .mount(&server)
            .await;

        let env = stub_agent(&server);
        let manager = SubagentManager::new(Arc::clone(&env.agent));

        let id = manager
            .spawn(SpawnRequest {
                task: "summarize the logs".into(),
                label: String::new(),
                origin_channel: "telegram".into(),
                origin_chat_id: "42".into(),
            })
            .unwrap();
        assert!(id.starts_with("sa_"));

        let announcement = tokio::time::timeout(
            Duration::from_secs(5),
            env.bus.consume_inbound(&env.cancel),
        )
        .await
        .expect("no announcement published")
        .unwrap();

        assert_eq!(announcement.channel, SYSTEM_CHANNEL);
        assert_eq!(announcement.chat_id, "telegram:42");
        assert_eq!(announcement.sender_id, id);
        assert!(announcement.content.contains("summarize the logs"));
        assert!(announcement.content.contains("found three log errors"));
    }

    #[tokio::test]
    async fn empty_task_is_rejected() {
        let server = MockServer::start().await;
        let env = stub_agent(&server);
        let manager = SubagentManager::new(Arc::clone(&env.agent));
        let err = manager
            .spawn(SpawnRequest {
                task: "   ".into(),
                label: String::new(),
                origin_channel: "cli".into(),
                origin_chat_id: "direct".into(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("task is empty"));
    }

    #[tokio::test]
    async fn subagent_failure_is_announced_as_error_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let env = stub_agent(&server);
        let manager = SubagentManager::new(Arc::clone(&env.agent));
        manager
            .spawn(SpawnRequest {
                task: "doomed".into(),
                label: "doomed".into(),
                origin_channel: "cli".into(),
                origin_chat_id: "direct".into(),
            })
            .unwrap();

        let announcement = tokio::time::timeout(
            Duration::from_secs(5),
            env.bus.consume_inbound(&env.cancel),
        )
        .await
        .expect("no announcement")
        .unwrap();
        assert!(announcement.content.contains("error:"));
    }

    #[test]
    fn labels_are_trimmed_to_thirty_chars() {
        assert_eq!(short_label("quick"), "quick");
        assert_eq!(short_label(""), "task");
        let long = "a task description that is definitely longer than thirty characters";
        assert_eq!(short_label(long).chars().count(), 30);
    }
}
