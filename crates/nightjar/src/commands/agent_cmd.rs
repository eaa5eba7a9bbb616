// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nightjar agent` - one-shot or interactive CLI turns.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use nightjar_agent::{AgentLoop, AgentLoopOptions, SessionManager, SkillLoader};
use nightjar_config::paths;
use nightjar_core::{Bus, NightjarError};
use nightjar_memory::IndexManager;

use super::{load_config, resolve_workspace};

pub async fn run(
    message: Option<String>,
    session: String,
    workspace: Option<PathBuf>,
    max_iters: usize,
) -> Result<(), NightjarError> {
    let cfg = Arc::new(load_config()?);
    let workspace = resolve_workspace(workspace)?;

    let memory = IndexManager::open(&cfg, &workspace).await?;
    let agent = AgentLoop::new(AgentLoopOptions {
        config: Arc::clone(&cfg),
        workspace: workspace.clone(),
        max_iters,
        bus: Arc::new(Bus::default()),
        sessions: SessionManager::new(paths::sessions_dir()?),
        skills: Some(Arc::new(SkillLoader::new(&workspace))),
        cron: None,
        memory: memory.map(|m| m as Arc<dyn nightjar_memory::SearchManager>),
        cancel: CancellationToken::new(),
    })?;

    if let Some(message) = message {
        let reply = agent
            .process_direct(&message, &session, "cli", "direct")
            .await?;
        println!("{reply}");
        return Ok(());
    }

    // Interactive session.
    println!("workspace: {}\nsession: {}\n(type /exit to quit)", workspace.display(), session);
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/exit" || line == "/quit" {
            break;
        }
        match agent.process_direct(line, &session, "cli", "direct").await {
            Ok(reply) => println!("{reply}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}
