// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model routing: resolve the effective LLM endpoint from a routed model
//! string.
//!
//! A model string with a recognized prefix (`openai/`, `openrouter/`,
//! `anthropic/`, `gemini/`, `ollama/`, `local/`) selects the provider and
//! strips the prefix; otherwise the explicit `llm.provider` hint is used.
//! `local` is an alias for `ollama`. Missing base URLs and API keys are
//! filled from per-provider defaults and the `env` credential map.

use crate::model::{
    Config, DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_GEMINI_BASE_URL, DEFAULT_OLLAMA_BASE_URL,
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENROUTER_BASE_URL,
};

/// Fallback model when neither `agents.defaults.model` nor `llm.model` is set.
const FALLBACK_MODEL: &str = "openai/gpt-4o-mini";

/// Split a routed model string into `(provider, model)`.
///
/// Returns an empty provider when the string has no recognized prefix.
pub fn parse_routed_model(s: &str) -> (&'static str, &str) {
    let s = s.trim();
    for (prefix, provider) in [
        ("openai/", "openai"),
        ("openrouter/", "openrouter"),
        ("anthropic/", "anthropic"),
        ("gemini/", "gemini"),
        ("ollama/", "ollama"),
        ("local/", "ollama"),
    ] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return (provider, rest);
        }
    }
    ("", s)
}

/// Normalize a provider hint (`local` aliases `ollama`).
pub fn canonical_provider(s: &str) -> String {
    let s = s.trim().to_ascii_lowercase();
    if s == "local" {
        "ollama".to_string()
    } else {
        s
    }
}

/// Default base URL for a provider name.
pub fn default_base_url(provider: &str) -> &'static str {
    match provider {
        "openrouter" => DEFAULT_OPENROUTER_BASE_URL,
        "anthropic" => DEFAULT_ANTHROPIC_BASE_URL,
        "gemini" => DEFAULT_GEMINI_BASE_URL,
        "ollama" => DEFAULT_OLLAMA_BASE_URL,
        _ => DEFAULT_OPENAI_BASE_URL,
    }
}

fn env_key_for(cfg: &Config, provider: &str) -> String {
    let get = |k: &str| cfg.env.get(k).map(|v| v.trim().to_string()).unwrap_or_default();
    match provider {
        "openai" => get("OPENAI_API_KEY"),
        "openrouter" => get("OPENROUTER_API_KEY"),
        "anthropic" => get("ANTHROPIC_API_KEY"),
        "gemini" => {
            let key = get("GEMINI_API_KEY");
            if key.is_empty() {
                get("GOOGLE_API_KEY")
            } else {
                key
            }
        }
        _ => String::new(),
    }
}

/// Resolve `cfg.llm` to the effective endpoint used at runtime.
///
/// Returns `(provider, configured_model)` where `configured_model` is the
/// routed string before prefix stripping.
pub fn apply_llm_routing(cfg: &mut Config) -> (String, String) {
    let provider_hint = canonical_provider(&cfg.llm.provider);
    cfg.llm.provider.clear();

    let mut configured_model = cfg.agents.defaults.model.trim().to_string();
    if configured_model.is_empty() {
        configured_model = cfg.llm.model.trim().to_string();
    }
    if configured_model.is_empty() {
        configured_model = FALLBACK_MODEL.to_string();
    }

    let (routed, model) = parse_routed_model(&configured_model);
    let provider = if routed.is_empty() {
        // No routing prefix; treat cfg.llm as already effective.
        let provider = provider_hint;
        cfg.llm.provider = provider.clone();
        if cfg.llm.base_url.trim().is_empty() {
            cfg.llm.base_url = default_base_url(&provider).to_string();
        }
        if cfg.llm.model.trim().is_empty() {
            cfg.llm.model = configured_model.clone();
        }
        provider
    } else {
        cfg.llm.provider = routed.to_string();
        cfg.llm.model = model.to_string();
        if cfg.llm.base_url.trim().is_empty() {
            cfg.llm.base_url = default_base_url(routed).to_string();
        }
        routed.to_string()
    };

    if cfg.llm.api_key.trim().is_empty() {
        cfg.llm.api_key = env_key_for(cfg, &provider);
    }

    (provider, configured_model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_select_providers() {
        assert_eq!(parse_routed_model("openai/gpt-4o-mini"), ("openai", "gpt-4o-mini"));
        assert_eq!(
            parse_routed_model("openrouter/openai/gpt-4o-mini"),
            ("openrouter", "openai/gpt-4o-mini")
        );
        assert_eq!(
            parse_routed_model("anthropic/claude-sonnet-4-20250514"),
            ("anthropic", "claude-sonnet-4-20250514")
        );
        assert_eq!(parse_routed_model("gemini/gemini-2.5-flash"), ("gemini", "gemini-2.5-flash"));
        assert_eq!(parse_routed_model("ollama/llama3"), ("ollama", "llama3"));
        assert_eq!(parse_routed_model("local/llama3"), ("ollama", "llama3"));
        assert_eq!(parse_routed_model("plain-model"), ("", "plain-model"));
    }

    #[test]
    fn local_provider_hint_aliases_ollama() {
        assert_eq!(canonical_provider("local"), "ollama");
        assert_eq!(canonical_provider("  Anthropic "), "anthropic");
    }

    #[test]
    fn routing_fills_base_url_and_key() {
        let mut cfg = Config::default();
        cfg.agents.defaults.model = "anthropic/claude-sonnet-4-20250514".into();
        cfg.env.insert("ANTHROPIC_API_KEY".into(), "sk-ant".into());

        let (provider, configured) = apply_llm_routing(&mut cfg);
        assert_eq!(provider, "anthropic");
        assert_eq!(configured, "anthropic/claude-sonnet-4-20250514");
        assert_eq!(cfg.llm.provider, "anthropic");
        assert_eq!(cfg.llm.model, "claude-sonnet-4-20250514");
        assert_eq!(cfg.llm.base_url, DEFAULT_ANTHROPIC_BASE_URL);
        assert_eq!(cfg.llm.api_key, "sk-ant");
    }

    #[test]
    fn gemini_falls_back_to_google_key() {
        let mut cfg = Config::default();
        cfg.agents.defaults.model = "gemini/gemini-2.5-flash".into();
        cfg.env.insert("GOOGLE_API_KEY".into(), "g-key".into());

        apply_llm_routing(&mut cfg);
        assert_eq!(cfg.llm.api_key, "g-key");
    }

    #[test]
    fn explicit_endpoint_survives_routing() {
        let mut cfg = Config::default();
        cfg.agents.defaults.model = "openai/gpt-4o-mini".into();
        cfg.llm.base_url = "http://localhost:9999/v1".into();
        cfg.llm.api_key = "explicit".into();
        cfg.env.insert("OPENAI_API_KEY".into(), "ignored".into());

        apply_llm_routing(&mut cfg);
        assert_eq!(cfg.llm.base_url, "http://localhost:9999/v1");
        assert_eq!(cfg.llm.api_key, "explicit");
    }

    #[test]
    fn unrouted_model_uses_provider_hint() {
        let mut cfg = Config::default();
        cfg.llm.provider = "local".into();
        cfg.llm.model = "llama3".into();

        let (provider, _) = apply_llm_routing(&mut cfg);
        assert_eq!(provider, "ollama");
        assert_eq!(cfg.llm.base_url, DEFAULT_OLLAMA_BASE_URL);
        assert_eq!(cfg.llm.model, "llama3");
    }

    #[test]
    fn empty_config_falls_back_to_default_model() {
        let mut cfg = Config::default();
        let (provider, configured) = apply_llm_routing(&mut cfg);
        assert_eq!(provider, "openai");
        assert_eq!(configured, "openai/gpt-4o-mini");
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
    }
}
