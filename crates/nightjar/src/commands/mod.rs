// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI command implementations.

pub mod agent_cmd;
pub mod channels_cmd;
pub mod cron_cmd;
pub mod gateway;
pub mod onboard;
pub mod status;

use std::path::PathBuf;

use nightjar_config::{loader, model::Config, paths};
use nightjar_core::NightjarError;

/// Load the config (defaults when absent) after ensuring state dirs.
pub fn load_config() -> Result<Config, NightjarError> {
    paths::ensure_state_dirs()?;
    loader::load_or_default(&paths::config_path()?)
}

/// Resolve the workspace: flag > `NIGHTJAR_WORKSPACE` > default, created
/// if missing.
pub fn resolve_workspace(flag: Option<PathBuf>) -> Result<PathBuf, NightjarError> {
    let dir = match flag {
        Some(dir) => dir,
        None => paths::workspace_dir()?,
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir.canonicalize().unwrap_or(dir))
}
