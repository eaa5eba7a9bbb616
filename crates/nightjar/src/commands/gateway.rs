// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nightjar gateway` - the long-lived service.
//!
//! Wires the bus, session store, cron, memory index, agent loop, subagent
//! manager, heartbeat, and channel adapters; then runs until SIGINT or
//! SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nightjar_agent::{AgentLoop, AgentLoopOptions, HeartbeatService, SessionManager, SkillLoader, SubagentManager};
use nightjar_channels::{ChannelManager, TelegramChannel};
use nightjar_config::paths;
use nightjar_core::{Bus, InboundMessage, NightjarError};
use nightjar_cron::{JobHandler, Service as CronService};
use nightjar_memory::IndexManager;

use super::{load_config, resolve_workspace};

pub async fn run(workspace: Option<PathBuf>, max_iters: usize) -> Result<(), NightjarError> {
    let cfg = Arc::new(load_config()?);
    let workspace = resolve_workspace(workspace)?;

    let cancel = install_signal_handler();
    let bus = Arc::new(Bus::default());
    let sessions = SessionManager::new(paths::sessions_dir()?);

    // Cron fires inject synthetic inbound messages bound to the job's
    // delivery target.
    let cron = if cfg.cron.enabled_value() {
        let handler: JobHandler = {
            let bus = Arc::clone(&bus);
            let cancel = cancel.clone();
            Arc::new(move |job: nightjar_cron::Job| {
                let bus = Arc::clone(&bus);
                let cancel = cancel.clone();
                Box::pin(async move {
                    if !job.payload.kind.is_empty() && job.payload.kind != "agent_turn" {
                        return Ok(String::new());
                    }
                    let channel = job.payload.channel.trim();
                    let to = job.payload.to.trim();
                    if !job.payload.deliver || channel.is_empty() || to.is_empty() {
                        return Ok(String::new());
                    }
                    bus.publish_inbound(
                        &cancel,
                        InboundMessage {
                            channel: channel.to_string(),
                            sender_id: format!("cron:{}", job.id),
                            chat_id: to.to_string(),
                            content: job.payload.message.clone(),
                            session_key: Some(format!("{channel}:{to}")),
                            delivery: None,
                        },
                    )
                    .await?;
                    Ok(String::new())
                })
            })
        };
        Some(CronService::new(paths::cron_store_path()?, Some(handler)))
    } else {
        None
    };

    let memory = IndexManager::open(&cfg, &workspace).await?;
    if memory.is_some() {
        info!("memory search enabled");
    }

    let agent = AgentLoop::new(AgentLoopOptions {
        config: Arc::clone(&cfg),
        workspace: workspace.clone(),
        max_iters,
        bus: Arc::clone(&bus),
        sessions: Arc::clone(&sessions),
        skills: Some(Arc::new(SkillLoader::new(&workspace))),
        cron: cron.clone(),
        memory: memory.map(|m| m as Arc<dyn nightjar_memory::SearchManager>),
        cancel: cancel.clone(),
    })?;

    let subagents = SubagentManager::new(Arc::clone(&agent));
    agent.set_spawn(subagents.spawn_fn()).await;

    if let Some(cron) = &cron {
        cron.start(cancel.clone()).await?;
        info!("cron service started");
    }

    let heartbeat = {
        let agent = Arc::clone(&agent);
        HeartbeatService::new(
            &workspace,
            cfg.heartbeat.enabled_value(),
            Duration::from_secs(cfg.heartbeat.interval_sec_value()),
            Arc::new(move |prompt: String| {
                let agent = Arc::clone(&agent);
                Box::pin(async move {
                    agent.process_direct(&prompt, "heartbeat", "cli", "heartbeat").await
                })
            }),
        )
    };
    heartbeat.start(cancel.clone());

    let mut channels = ChannelManager::new(Arc::clone(&bus));
    if cfg.channels.telegram.enabled {
        channels.add(Arc::new(TelegramChannel::new(
            &cfg.channels.telegram,
            Arc::clone(&bus),
        )?));
    }
    for (name, enabled) in [
        ("discord", cfg.channels.discord.enabled),
        ("slack", cfg.channels.slack.enabled),
        ("whatsapp", cfg.channels.whatsapp.enabled),
    ] {
        if enabled {
            warn!(channel = name, "channel enabled in config but no adapter is bundled");
        }
    }
    channels.start_all(cancel.clone());

    {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            if let Err(e) = agent.run().await {
                warn!(error = %e, "agent loop exited");
            }
        });
    }

    println!("gateway running");
    println!("- workspace: {}", workspace.display());
    println!("- sessions:  {}", sessions.dir().display());
    println!("stop: Ctrl+C");
    cancel.cancelled().await;

    channels.stop_all().await;
    if let Some(cron) = &cron {
        cron.stop().await;
    }
    info!("gateway stopped");
    Ok(())
}

/// Cancel the returned token on SIGINT (Ctrl+C) or SIGTERM.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, shutting down");
        }

        token_clone.cancel();
    });

    token
}
