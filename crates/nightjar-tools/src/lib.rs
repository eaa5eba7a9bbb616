// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool registry for the agent loop.
//!
//! Each tool declares a JSON-schema parameter block advertised to the
//! model; execution is dispatched by name. Optional capabilities (bus
//! publisher, subagent spawner, cron service, skill reader, memory
//! manager) gate both advertisement and execution. When `allow_tools` is
//! non-empty it further restricts the registry to that subset.
//!
//! Tool implementation failures are returned as `Err` and converted by
//! the caller into `"error: ..."` text for the model; only unknown and
//! disabled tool names are infrastructure errors.

mod cron_tool;
mod defs;
mod exec;
mod fs;
mod html;
mod memory_tool;
mod web;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

use nightjar_core::{NightjarError, OutboundMessage};
use nightjar_llm::ToolDefinition;
use nightjar_memory::SearchManager;

pub use defs::tool_definitions;

/// Publishes an outbound message to the bus.
pub type OutboundFn =
    Arc<dyn Fn(OutboundMessage) -> BoxFuture<'static, Result<(), NightjarError>> + Send + Sync>;

/// Launches a background subagent; returns its task id immediately.
pub type SpawnFn =
    Arc<dyn Fn(SpawnRequest) -> BoxFuture<'static, Result<String, NightjarError>> + Send + Sync>;

/// Reads a skill's SKILL.md by name.
pub type SkillReader = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A subagent launch request carrying the originating conversation.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub task: String,
    pub label: String,
    pub origin_channel: String,
    pub origin_chat_id: String,
}

/// The conversation a tool call executes within.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub channel: String,
    pub chat_id: String,
    pub session_key: String,
}

/// The tool registry. Fields are capabilities; leave them `None`/empty to
/// drop the corresponding tools from both advertisement and execution.
pub struct Registry {
    pub workspace_dir: PathBuf,
    pub restrict_to_workspace: bool,
    pub exec_timeout: Duration,
    /// When non-empty, only these tool names are exposed and executable.
    pub allow_tools: Vec<String>,
    pub brave_api_key: String,
    pub outbound: Option<OutboundFn>,
    pub spawn: Option<SpawnFn>,
    pub cron: Option<Arc<nightjar_cron::Service>>,
    pub read_skill: Option<SkillReader>,
    pub memory: Option<Arc<dyn SearchManager>>,
    /// Brave endpoint override for tests.
    pub(crate) brave_base_url: Option<String>,
}

impl Registry {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Registry {
            workspace_dir: workspace_dir.into(),
            restrict_to_workspace: true,
            exec_timeout: Duration::from_secs(60),
            allow_tools: Vec::new(),
            brave_api_key: String::new(),
            outbound: None,
            spawn: None,
            cron: None,
            read_skill: None,
            memory: None,
            brave_base_url: None,
        }
    }

    /// Point web_search at a mock server.
    #[cfg(test)]
    pub(crate) fn with_brave_base_url(mut self, url: String) -> Self {
        self.brave_base_url = Some(url);
        self
    }

    /// Tool definitions advertised to the model, filtered by capabilities
    /// and the allow-list.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = tool_definitions(
            self.read_skill.is_some(),
            !self.brave_api_key.trim().is_empty(),
            self.outbound.is_some(),
            self.spawn.is_some(),
            self.cron.is_some(),
            self.memory.is_some(),
        );
        if self.allow_tools.is_empty() {
            return defs;
        }
        let allow = self.allow_set();
        defs.retain(|d| allow.contains(d.name()));
        defs
    }

    /// Execute a tool by name with raw JSON arguments.
    pub async fn execute(
        &self,
        tctx: &ToolContext,
        name: &str,
        args: Value,
    ) -> Result<String, NightjarError> {
        if !self.allowed(name) {
            return Err(NightjarError::ToolDisabled(name.to_string()));
        }
        match name {
            "read_file" => {
                #[derive(Deserialize)]
                struct Args {
                    path: String,
                }
                let a: Args = parse_args(args)?;
                self.read_file(&a.path)
            }
            "write_file" => {
                #[derive(Deserialize)]
                struct Args {
                    path: String,
                    content: String,
                }
                let a: Args = parse_args(args)?;
                self.write_file(&a.path, &a.content)
            }
            "edit_file" => {
                let obj = args.as_object().cloned().unwrap_or_default();
                if !obj.contains_key("old_text") && !obj.contains_key("new_text") {
                    // Back-compat: older line-range edit.
                    #[derive(Deserialize)]
                    struct Args {
                        path: String,
                        #[serde(rename = "startLine", default)]
                        start_line: usize,
                        #[serde(rename = "endLine", default)]
                        end_line: usize,
                        #[serde(rename = "newText", default)]
                        new_text: String,
                    }
                    let a: Args = parse_args(Value::Object(obj))?;
                    return self.edit_file_lines(&a.path, a.start_line, a.end_line, &a.new_text);
                }
                #[derive(Deserialize)]
                struct Args {
                    path: String,
                    #[serde(default)]
                    old_text: String,
                    #[serde(default)]
                    new_text: String,
                }
                let a: Args = parse_args(Value::Object(obj))?;
                self.edit_file_replace(&a.path, &a.old_text, &a.new_text)
            }
            "list_dir" => {
                #[derive(Deserialize)]
                struct Args {
                    path: String,
                    #[serde(default)]
                    recursive: bool,
                    #[serde(rename = "maxEntries", default)]
                    max_entries: usize,
                }
                let a: Args = parse_args(args)?;
                self.list_dir(&a.path, a.recursive, a.max_entries)
            }
            "exec" => {
                #[derive(Deserialize)]
                struct Args {
                    command: String,
                }
                let a: Args = parse_args(args)?;
                self.exec(&a.command).await
            }
            "read_skill" => {
                #[derive(Deserialize)]
                struct Args {
                    name: String,
                }
                let a: Args = parse_args(args)?;
                let Some(reader) = &self.read_skill else {
                    return Err(NightjarError::Tool("skills not configured".into()));
                };
                reader(&a.name)
                    .ok_or_else(|| NightjarError::Tool(format!("skill not found: {}", a.name)))
            }
            "web_fetch" => {
                #[derive(Deserialize)]
                struct Args {
                    url: String,
                    #[serde(rename = "extractMode", default)]
                    extract_mode: String,
                    #[serde(rename = "maxChars", default)]
                    max_chars: usize,
                }
                let a: Args = parse_args(args)?;
                self.web_fetch(&a.url, &a.extract_mode, a.max_chars).await
            }
            "web_search" => {
                #[derive(Deserialize)]
                struct Args {
                    query: String,
                    #[serde(default)]
                    count: usize,
                }
                let a: Args = parse_args(args)?;
                self.web_search(&a.query, a.count).await
            }
            "message" => {
                #[derive(Deserialize)]
                struct Args {
                    content: String,
                    channel: String,
                    chat_id: String,
                }
                let a: Args = parse_args(args)?;
                self.message(tctx, &a.channel, &a.chat_id, &a.content).await
            }
            "spawn" => {
                #[derive(Deserialize)]
                struct Args {
                    task: String,
                    #[serde(default)]
                    label: String,
                }
                let a: Args = parse_args(args)?;
                let Some(spawn) = &self.spawn else {
                    return Err(NightjarError::Tool("subagents not configured".into()));
                };
                let id = spawn(SpawnRequest {
                    task: a.task,
                    label: a.label,
                    origin_channel: tctx.channel.clone(),
                    origin_chat_id: tctx.chat_id.clone(),
                })
                .await?;
                Ok(format!("Spawned background task {id}; completion will be announced."))
            }
            "cron" => {
                #[derive(Deserialize)]
                struct Args {
                    action: String,
                    #[serde(default)]
                    message: String,
                    #[serde(default)]
                    every_seconds: i64,
                    #[serde(default)]
                    cron_expr: String,
                    #[serde(default)]
                    job_id: String,
                }
                let a: Args = parse_args(args)?;
                self.cron_tool(tctx, &a.action, &a.message, a.every_seconds, &a.cron_expr, &a.job_id)
                    .await
            }
            "memory_search" => {
                #[derive(Deserialize)]
                struct Args {
                    query: String,
                    #[serde(rename = "maxResults", default)]
                    max_results: Option<usize>,
                    #[serde(rename = "minScore", default)]
                    min_score: Option<f64>,
                }
                let a: Args = parse_args(args)?;
                self.memory_search(&a.query, a.max_results, a.min_score).await
            }
            "memory_get" => {
                #[derive(Deserialize)]
                struct Args {
                    path: String,
                    #[serde(default)]
                    from: Option<usize>,
                    #[serde(default)]
                    lines: Option<usize>,
                }
                let a: Args = parse_args(args)?;
                self.memory_get(&a.path, a.from, a.lines).await
            }
            other => Err(NightjarError::UnknownTool(other.to_string())),
        }
    }

    /// Send a message to another conversation via the outbound queue.
    async fn message(
        &self,
        tctx: &ToolContext,
        channel: &str,
        chat_id: &str,
        content: &str,
    ) -> Result<String, NightjarError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(NightjarError::Tool("content is empty".into()));
        }
        let channel = channel.trim();
        let chat_id = chat_id.trim();
        if channel.is_empty() || chat_id.is_empty() {
            return Err(NightjarError::Tool(
                "message requires explicit channel and chat_id".into(),
            ));
        }
        // The active conversation gets its reply inline; the message tool
        // is only for reaching a different chat.
        if !tctx.channel.trim().is_empty()
            && !tctx.chat_id.trim().is_empty()
            && channel == tctx.channel.trim()
            && chat_id == tctx.chat_id.trim()
        {
            return Err(NightjarError::Tool(
                "message to current session is not allowed; respond with assistant text instead"
                    .into(),
            ));
        }
        let Some(outbound) = &self.outbound else {
            return Err(NightjarError::Tool("message sending not configured".into()));
        };
        outbound(OutboundMessage {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            reply_to: None,
            delivery: None,
        })
        .await?;
        Ok(format!("Message sent to {channel}:{chat_id}"))
    }

    fn allowed(&self, name: &str) -> bool {
        self.allow_tools.is_empty() || self.allow_set().contains(name)
    }

    fn allow_set(&self) -> HashSet<&str> {
        self.allow_tools
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, NightjarError> {
    serde_json::from_value(args).map_err(|e| NightjarError::Tool(format!("invalid arguments: {e}")))
}
