// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nightjar cron ...` - job management against the shared store.

use chrono::DateTime;

use nightjar_config::paths;
use nightjar_core::NightjarError;
use nightjar_cron::{Payload, Schedule, Service};

use crate::CronCommands;

use super::load_config;

pub async fn run(command: CronCommands) -> Result<(), NightjarError> {
    let _cfg = load_config()?;
    let service = Service::new(paths::cron_store_path()?, None);

    match command {
        CronCommands::List => {
            let jobs = service.list(true).await?;
            if jobs.is_empty() {
                println!("No jobs.");
                return Ok(());
            }
            for job in jobs {
                println!(
                    "- {} id={} enabled={} kind={:?} next={}",
                    job.name, job.id, job.enabled, job.schedule.kind, job.state.next_run_at_ms
                );
            }
            Ok(())
        }
        CronCommands::Add {
            name,
            message,
            every,
            cron,
            at,
            no_deliver,
            channel,
            to,
        } => {
            let message = message.trim().to_string();
            let job_name = name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| message.clone());

            let schedule = match (every, cron, at) {
                (Some(every), _, _) if every > 0 => Schedule::every(every * 1000),
                (_, Some(expr), _) if !expr.trim().is_empty() => Schedule::cron(expr.trim()),
                (_, _, Some(at)) if !at.trim().is_empty() => {
                    let parsed = DateTime::parse_from_rfc3339(at.trim()).map_err(|e| {
                        NightjarError::Schedule(format!("invalid --at timestamp: {e}"))
                    })?;
                    Schedule::at(parsed.timestamp_millis())
                }
                _ => {
                    eprintln!("one of --every/--cron/--at is required");
                    std::process::exit(2);
                }
            };

            let mut payload = Payload {
                kind: "agent_turn".into(),
                message,
                deliver: !no_deliver,
                channel: channel.unwrap_or_default(),
                to: to.unwrap_or_default(),
            };
            payload.channel = payload.channel.trim().to_string();
            payload.to = payload.to.trim().to_string();

            let job = service.add(job_name, schedule, payload).await?;
            println!("Created job {} (id={})", job.name, job.id);
            Ok(())
        }
        CronCommands::Remove { job_id } => {
            if service.remove(&job_id).await? {
                println!("Removed: {job_id}");
            } else {
                println!("Not found: {job_id}");
            }
            Ok(())
        }
        CronCommands::Toggle { job_id, disable } => {
            if service.toggle(&job_id, disable).await? {
                println!("{}: {job_id}", if disable { "Disabled" } else { "Enabled" });
            } else {
                println!("Not found: {job_id}");
            }
            Ok(())
        }
        CronCommands::Run { job_id, force } => {
            service.run_now(&job_id, force).await?;
            println!("Triggered: {job_id}");
            Ok(())
        }
    }
}
