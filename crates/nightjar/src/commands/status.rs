// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nightjar status` - configuration and state overview.

use nightjar_config::paths;
use nightjar_core::NightjarError;
use nightjar_cron::Service;
use nightjar_memory::{IndexManager, SearchManager};

use super::{load_config, resolve_workspace};

pub async fn run() -> Result<(), NightjarError> {
    let cfg = load_config()?;
    let workspace = resolve_workspace(None)?;

    println!("config:    {}", paths::config_path()?.display());
    println!("workspace: {}", workspace.display());
    println!("model:     {}/{}", cfg.llm.provider, cfg.llm.model);
    println!(
        "llm key:   {}",
        if cfg.llm.api_key.trim().is_empty() {
            "missing"
        } else {
            "configured"
        }
    );

    println!("channels:");
    for (name, enabled) in [
        ("telegram", cfg.channels.telegram.enabled),
        ("discord", cfg.channels.discord.enabled),
        ("slack", cfg.channels.slack.enabled),
        ("whatsapp", cfg.channels.whatsapp.enabled),
    ] {
        println!("  {name}: {}", if enabled { "enabled" } else { "disabled" });
    }

    let cron = Service::new(paths::cron_store_path()?, None);
    let jobs = cron.list(true).await?;
    println!(
        "cron:      {} ({} jobs)",
        if cfg.cron.enabled_value() { "enabled" } else { "disabled" },
        jobs.len()
    );
    println!(
        "heartbeat: {} ({}s)",
        if cfg.heartbeat.enabled_value() { "enabled" } else { "disabled" },
        cfg.heartbeat.interval_sec_value()
    );

    match IndexManager::open(&cfg, &workspace).await? {
        Some(memory) => {
            let status = memory.status().await;
            println!(
                "memory:    enabled ({} files, {} chunks, vector dims {}, model {})",
                status.files, status.chunks, status.vector_dims, status.model
            );
            if !status.last_error.is_empty() {
                println!("  last error: {}", status.last_error);
            }
        }
        None => println!("memory:    disabled"),
    }

    Ok(())
}
