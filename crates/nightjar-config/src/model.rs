// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All sections are optional in the JSON document and fall back to the
//! defaults below. Field names follow the on-disk camelCase convention.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_AGENT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_AGENT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_AGENT_MEMORY_WINDOW: usize = 50;
pub const DEFAULT_MEMORY_CHUNK_TOKENS: usize = 400;
pub const DEFAULT_MEMORY_CHUNK_OVERLAP: usize = 80;
pub const DEFAULT_MEMORY_MAX_RESULTS: usize = 6;
pub const DEFAULT_MEMORY_MIN_SCORE: f64 = 0.35;
pub const DEFAULT_MEMORY_VECTOR_WEIGHT: f64 = 0.7;
pub const DEFAULT_MEMORY_TEXT_WEIGHT: f64 = 0.3;
pub const DEFAULT_MEMORY_CANDIDATE_MULTIPLIER: usize = 4;
pub const DEFAULT_EXEC_TIMEOUT_SEC: u64 = 60;
pub const DEFAULT_HEARTBEAT_INTERVAL_SEC: u64 = 30 * 60;
pub const DEFAULT_GATEWAY_LISTEN: &str = "0.0.0.0:18790";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_GEMINI_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Top-level Nightjar configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Provider credentials consumed by routing and the embedding provider
    /// (`OPENAI_API_KEY`, `OPENROUTER_API_KEY`, `ANTHROPIC_API_KEY`,
    /// `GEMINI_API_KEY`, `GOOGLE_API_KEY`).
    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub agents: AgentsConfig,

    /// Effective LLM endpoint; populated by routing at load time.
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub cron: CronConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaultsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefaultsConfig {
    /// Routed model string, e.g. `"anthropic/claude-sonnet-4-20250514"`.
    #[serde(default)]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_window: Option<usize>,

    #[serde(default)]
    pub memory_search: MemorySearchConfig,
}

impl AgentDefaultsConfig {
    pub fn max_tokens_value(&self) -> u32 {
        match self.max_tokens {
            Some(v) if v > 0 => v,
            _ => DEFAULT_AGENT_MAX_TOKENS,
        }
    }

    pub fn temperature_value(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_AGENT_TEMPERATURE)
    }

    pub fn memory_window_value(&self) -> usize {
        match self.memory_window {
            Some(v) if v > 0 => v,
            _ => DEFAULT_AGENT_MEMORY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, rename = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Hybrid memory search configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Embedding provider; only OpenAI-compatible endpoints are supported.
    #[serde(default)]
    pub provider: String,

    /// Embedding model (required when enabled).
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub remote: MemorySearchRemoteConfig,

    #[serde(default)]
    pub store: MemorySearchStoreConfig,

    #[serde(default)]
    pub chunking: MemorySearchChunkingConfig,

    #[serde(default)]
    pub query: MemorySearchQueryConfig,

    #[serde(default)]
    pub cache: MemorySearchCacheConfig,

    #[serde(default)]
    pub sync: MemorySearchSyncConfig,
}

impl MemorySearchConfig {
    pub fn enabled_value(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchRemoteConfig {
    #[serde(default, rename = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchStoreConfig {
    /// Index path; `{workspace}` expands to the workspace dir. Defaults to
    /// `<workspace>/.memory/index.sqlite`.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub vector: MemorySearchVectorConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchVectorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl MemorySearchVectorConfig {
    pub fn enabled_value(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchChunkingConfig {
    #[serde(default)]
    pub tokens: usize,
    #[serde(default)]
    pub overlap: usize,
}

impl Default for MemorySearchChunkingConfig {
    fn default() -> Self {
        Self {
            tokens: DEFAULT_MEMORY_CHUNK_TOKENS,
            overlap: DEFAULT_MEMORY_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchQueryConfig {
    #[serde(default)]
    pub max_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub hybrid: MemorySearchHybridConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchHybridConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_weight: Option<f64>,
    #[serde(default)]
    pub candidate_multiplier: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchCacheConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub max_entries: usize,
}

impl MemorySearchCacheConfig {
    pub fn enabled_value(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchSyncConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_search: Option<bool>,
}

impl MemorySearchSyncConfig {
    pub fn on_search_value(&self) -> bool {
        self.on_search.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict_to_workspace: Option<bool>,
    #[serde(default)]
    pub exec: ExecToolConfig,
    #[serde(default)]
    pub web: WebToolsConfig,
}

impl ToolsConfig {
    pub fn restrict_to_workspace_value(&self) -> bool {
        self.restrict_to_workspace.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecToolConfig {
    #[serde(default)]
    pub timeout_sec: u64,
}

impl ExecToolConfig {
    pub fn timeout_sec_value(&self) -> u64 {
        if self.timeout_sec == 0 {
            DEFAULT_EXEC_TIMEOUT_SEC
        } else {
            self.timeout_sec
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebToolsConfig {
    #[serde(default)]
    pub brave_api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl CronConfig {
    pub fn enabled_value(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub interval_sec: u64,
}

impl HeartbeatConfig {
    pub fn enabled_value(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn interval_sec_value(&self) -> u64 {
        if self.interval_sec == 0 {
            DEFAULT_HEARTBEAT_INTERVAL_SEC
        } else {
            self.interval_sec
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Informational TCP listen address (reserved for channel webhooks).
    #[serde(default)]
    pub listen: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

/// Telegram (Bot API via long polling). The in-tree adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub allow_from: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub allow_from: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub app_token: String,
    #[serde(default)]
    pub allow_from: Vec<String>,
}

/// WhatsApp Web multi-device. The persistent-store variant: a session
/// store on disk keeps the login; QR pairing happens out-of-band.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_from: Vec<String>,
    #[serde(default)]
    pub session_store_path: String,
}
