// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nightjar onboard` - first-run scaffolding. Idempotent.

use nightjar_config::{loader, model::Config, paths};
use nightjar_core::NightjarError;

const MEMORY_TEMPLATE: &str = "# Long-term Memory\n\nFacts worth keeping across conversations.\n";

const HEARTBEAT_TEMPLATE: &str = "# Heartbeat\n\n<!-- Tasks listed here run on the heartbeat. -->\n\n- [ ]\n";

const AGENTS_TEMPLATE: &str = "# Agents\n\nHouse rules for the assistant working in this workspace.\n";

pub fn run() -> Result<(), NightjarError> {
    paths::ensure_state_dirs()?;

    let config_path = paths::config_path()?;
    if config_path.exists() {
        println!("config exists: {}", config_path.display());
    } else {
        loader::save(&config_path, &Config::default())?;
        println!("created config: {}", config_path.display());
    }

    let workspace = paths::workspace_dir()?;
    std::fs::create_dir_all(&workspace)?;
    std::fs::create_dir_all(workspace.join("memory"))?;
    std::fs::create_dir_all(workspace.join("skills"))?;

    for (name, template) in [
        ("MEMORY.md", MEMORY_TEMPLATE),
        ("HEARTBEAT.md", HEARTBEAT_TEMPLATE),
        ("AGENTS.md", AGENTS_TEMPLATE),
    ] {
        let path = workspace.join(name);
        if !path.exists() {
            std::fs::write(&path, template)?;
            println!("created {}", path.display());
        }
    }

    println!("workspace: {}", workspace.display());
    println!("sessions:  {}", paths::sessions_dir()?.display());
    Ok(())
}
