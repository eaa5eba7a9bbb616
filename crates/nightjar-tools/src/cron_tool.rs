// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The cron tool: schedule, list, and remove jobs on behalf of the model.
//!
//! Added jobs are bound to the current session's channel/chat so cron
//! fires route back to the conversation that created them.

use nightjar_core::NightjarError;
use nightjar_cron::{Payload, Schedule};

use crate::{Registry, ToolContext};

impl Registry {
    pub(crate) async fn cron_tool(
        &self,
        tctx: &ToolContext,
        action: &str,
        message: &str,
        every_seconds: i64,
        cron_expr: &str,
        job_id: &str,
    ) -> Result<String, NightjarError> {
        let Some(cron) = &self.cron else {
            return Err(NightjarError::Tool("cron service not configured".into()));
        };

        match action.trim() {
            "add" => {
                let message = message.trim();
                if message.is_empty() {
                    return Err(NightjarError::Tool("message is required".into()));
                }
                if tctx.channel.trim().is_empty() || tctx.chat_id.trim().is_empty() {
                    return Err(NightjarError::Tool("no session context (channel/chat_id)".into()));
                }
                let schedule = if every_seconds > 0 {
                    Schedule::every(every_seconds * 1000)
                } else if !cron_expr.trim().is_empty() {
                    Schedule::cron(cron_expr.trim())
                } else {
                    return Err(NightjarError::Tool(
                        "either every_seconds or cron_expr is required".into(),
                    ));
                };
                let payload = Payload::agent_turn(message, tctx.channel.trim(), tctx.chat_id.trim());
                let job = cron.add(short_name(message), schedule, payload).await?;
                Ok(format!("Created job '{}' (id: {})", job.name, job.id))
            }
            "list" => {
                let jobs = cron.list(false).await?;
                if jobs.is_empty() {
                    return Ok("No scheduled jobs.".into());
                }
                let mut out = String::from("Scheduled jobs:\n");
                for job in jobs {
                    out.push_str(&format!(
                        "- {} (id: {}, {:?})\n",
                        job.name, job.id, job.schedule.kind
                    ));
                }
                Ok(out.trim_end().to_string())
            }
            "remove" => {
                let job_id = job_id.trim();
                if job_id.is_empty() {
                    return Err(NightjarError::Tool("job_id is required".into()));
                }
                if cron.remove(job_id).await? {
                    Ok(format!("Removed job {job_id}"))
                } else {
                    Ok(format!("Job not found: {job_id}"))
                }
            }
            other => Err(NightjarError::Tool(format!("unknown action: {other}"))),
        }
    }
}

fn short_name(s: &str) -> String {
    let s = s.trim();
    if s.chars().count() <= 30 {
        return s.to_string();
    }
    s.chars().take(30).collect()
}
