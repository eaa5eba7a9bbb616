// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading and writing the configuration document.
//!
//! The document is a single JSON file written atomically (tmp + rename).
//! Loading applies model routing so `cfg.llm` always holds the effective
//! endpoint by the time callers see the config.

use std::path::Path;

use nightjar_core::NightjarError;

use crate::model::Config;
use crate::routing::apply_llm_routing;

/// Load the configuration from `path` and resolve LLM routing.
pub fn load(path: &Path) -> Result<Config, NightjarError> {
    let raw = std::fs::read_to_string(path)?;
    let mut cfg: Config = serde_json::from_str(&raw)
        .map_err(|e| NightjarError::Config(format!("parse {}: {e}", path.display())))?;
    apply_llm_routing(&mut cfg);
    Ok(cfg)
}

/// Load the configuration, falling back to defaults when the file does not
/// exist yet. Parse errors are still surfaced.
pub fn load_or_default(path: &Path) -> Result<Config, NightjarError> {
    if !path.exists() {
        let mut cfg = Config::default();
        apply_llm_routing(&mut cfg);
        return Ok(cfg);
    }
    load(path)
}

/// Write the configuration atomically.
pub fn save(path: &Path, cfg: &Config) -> Result<(), NightjarError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut body = serde_json::to_string_pretty(cfg)
        .map_err(|e| NightjarError::Config(format!("encode config: {e}")))?;
    body.push('\n');
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
