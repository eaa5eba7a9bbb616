// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State-directory layout.
//!
//! All persistent state lives under a single directory, `~/.nightjar` by
//! default, overridable with `NIGHTJAR_HOME`:
//!
//! ```text
//! ~/.nightjar/
//!   config.json
//!   cron.json
//!   sessions/*.json
//!   workspace/        (default workspace)
//! ```

use std::path::PathBuf;

use nightjar_core::NightjarError;

/// Environment variable overriding the state directory.
pub const HOME_ENV: &str = "NIGHTJAR_HOME";

/// Environment variable overriding the workspace directory.
pub const WORKSPACE_ENV: &str = "NIGHTJAR_WORKSPACE";

/// The Nightjar state directory.
pub fn config_dir() -> Result<PathBuf, NightjarError> {
    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".nightjar"))
        .ok_or_else(|| NightjarError::Config("cannot resolve home directory".into()))
}

/// Path of the configuration document.
pub fn config_path() -> Result<PathBuf, NightjarError> {
    Ok(config_dir()?.join("config.json"))
}

/// Directory holding one JSON file per session key.
pub fn sessions_dir() -> Result<PathBuf, NightjarError> {
    Ok(config_dir()?.join("sessions"))
}

/// Path of the cron job store.
pub fn cron_store_path() -> Result<PathBuf, NightjarError> {
    Ok(config_dir()?.join("cron.json"))
}

/// Default workspace directory.
pub fn workspace_dir() -> Result<PathBuf, NightjarError> {
    if let Ok(dir) = std::env::var(WORKSPACE_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    Ok(config_dir()?.join("workspace"))
}

/// Create the state directory and sessions directory if missing.
pub fn ensure_state_dirs() -> Result<(), NightjarError> {
    std::fs::create_dir_all(config_dir()?)?;
    std::fs::create_dir_all(sessions_dir()?)?;
    Ok(())
}
