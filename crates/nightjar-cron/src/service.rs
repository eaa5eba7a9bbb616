// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persistent job store and timer-driven runner.
//!
//! The store is one JSON document; every mutation reloads it first so a
//! short-lived CLI process and a running gateway can share the file, and
//! every write is atomic (tmp + rename). A single timer task sleeps until
//! the earliest `next_run_at_ms` across enabled jobs, sweeps everything
//! due, and re-arms; mutations wake it early.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, TimeZone, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use nightjar_core::NightjarError;

use crate::expr::CronSchedule;

/// Handler invoked for each due job.
pub type JobHandler =
    Arc<dyn Fn(Job) -> BoxFuture<'static, Result<String, NightjarError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    At,
    Every,
    Cron,
}

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub kind: ScheduleKind,
    /// Absolute fire time for `at` jobs (unix ms).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub at_ms: i64,
    /// Period for `every` jobs (ms).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub every_ms: i64,
    /// 5-field expression for `cron` jobs.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expr: String,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl Schedule {
    pub fn at(at_ms: i64) -> Self {
        Schedule {
            kind: ScheduleKind::At,
            at_ms,
            every_ms: 0,
            expr: String::new(),
        }
    }

    pub fn every(every_ms: i64) -> Self {
        Schedule {
            kind: ScheduleKind::Every,
            at_ms: 0,
            every_ms,
            expr: String::new(),
        }
    }

    pub fn cron(expr: impl Into<String>) -> Self {
        Schedule {
            kind: ScheduleKind::Cron,
            at_ms: 0,
            every_ms: 0,
            expr: expr.into(),
        }
    }
}

/// What a job does when it fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Only `"agent_turn"` is understood by the gateway handler.
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub deliver: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
}

impl Payload {
    pub fn agent_turn(message: impl Into<String>, channel: impl Into<String>, to: impl Into<String>) -> Self {
        Payload {
            kind: "agent_turn".into(),
            message: message.into(),
            deliver: true,
            channel: channel.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub next_run_at_ms: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_run_at_ms: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub schedule: Schedule,
    pub payload: Payload,
    #[serde(default)]
    pub state: JobState,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delete_after_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub version: u32,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

struct Inner {
    store: Store,
    running: bool,
}

/// The cron service.
pub struct Service {
    store_path: PathBuf,
    on_job: Option<JobHandler>,
    inner: Mutex<Inner>,
    rearm: Notify,
}

impl Service {
    pub fn new(store_path: impl Into<PathBuf>, on_job: Option<JobHandler>) -> Arc<Self> {
        Arc::new(Service {
            store_path: store_path.into(),
            on_job,
            inner: Mutex::new(Inner {
                store: Store {
                    version: 1,
                    jobs: Vec::new(),
                },
                running: false,
            }),
            rearm: Notify::new(),
        })
    }

    /// Load the store, recompute next runs, and start the timer task.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<(), NightjarError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.running {
                return Ok(());
            }
            self.load_locked(&mut inner)?;
            let now = now_ms();
            for job in &mut inner.store.jobs {
                job.state.next_run_at_ms = if job.enabled {
                    compute_next_run_ms(&job.schedule, now)
                } else {
                    0
                };
            }
            self.save_locked(&inner)?;
            inner.running = true;
        }

        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.timer_loop(cancel).await;
        });
        Ok(())
    }

    /// Stop the timer task. Idempotent.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        inner.running = false;
        drop(inner);
        self.rearm.notify_one();
    }

    /// List jobs, reloading the store first.
    pub async fn list(&self, include_disabled: bool) -> Result<Vec<Job>, NightjarError> {
        let mut inner = self.inner.lock().await;
        self.load_locked(&mut inner)?;
        Ok(inner
            .store
            .jobs
            .iter()
            .filter(|j| include_disabled || j.enabled)
            .cloned()
            .collect())
    }

    /// Validate and persist a new job.
    pub async fn add(
        &self,
        name: impl Into<String>,
        schedule: Schedule,
        payload: Payload,
    ) -> Result<Job, NightjarError> {
        let mut inner = self.inner.lock().await;
        self.load_locked(&mut inner)?;

        let now = now_ms();
        validate_schedule(&schedule, now)?;
        let next_run = compute_next_run_ms(&schedule, now);
        if next_run <= 0 {
            return Err(NightjarError::Schedule(format!(
                "failed to compute next run for schedule kind: {:?}",
                schedule.kind
            )));
        }

        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            enabled: true,
            schedule,
            payload,
            state: JobState {
                next_run_at_ms: next_run,
                ..Default::default()
            },
            created_at_ms: now,
            updated_at_ms: now,
            delete_after_run: false,
        };
        inner.store.jobs.push(job.clone());
        self.save_locked(&inner)?;
        drop(inner);
        self.rearm.notify_one();
        Ok(job)
    }

    /// Remove a job by id. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> Result<bool, NightjarError> {
        let mut inner = self.inner.lock().await;
        self.load_locked(&mut inner)?;
        let before = inner.store.jobs.len();
        inner.store.jobs.retain(|j| j.id != id);
        let removed = inner.store.jobs.len() != before;
        self.save_locked(&inner)?;
        drop(inner);
        self.rearm.notify_one();
        Ok(removed)
    }

    /// Enable or disable a job. Returns whether it existed.
    pub async fn toggle(&self, id: &str, disable: bool) -> Result<bool, NightjarError> {
        let mut inner = self.inner.lock().await;
        self.load_locked(&mut inner)?;
        let now = now_ms();
        let mut found = false;
        for job in &mut inner.store.jobs {
            if job.id != id {
                continue;
            }
            job.enabled = !disable;
            job.state.next_run_at_ms = if job.enabled {
                compute_next_run_ms(&job.schedule, now)
            } else {
                0
            };
            job.updated_at_ms = now;
            found = true;
            break;
        }
        if found {
            self.save_locked(&inner)?;
        }
        drop(inner);
        self.rearm.notify_one();
        Ok(found)
    }

    /// Execute a job immediately. Disabled jobs require `force`.
    pub async fn run_now(&self, id: &str, force: bool) -> Result<String, NightjarError> {
        let job = {
            let mut inner = self.inner.lock().await;
            self.load_locked(&mut inner)?;
            inner.store.jobs.iter().find(|j| j.id == id).cloned()
        };
        let Some(job) = job else {
            return Err(NightjarError::Tool(format!("job not found: {id}")));
        };
        if !job.enabled && !force {
            return Err(NightjarError::Tool(format!("job disabled: {id} (use force)")));
        }
        self.execute(job).await
    }

    async fn timer_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let wake = {
                let inner = self.inner.lock().await;
                if !inner.running {
                    return;
                }
                next_wake_ms(&inner.store)
            };

            let delay = match wake {
                Some(ms) => {
                    let until = (ms - now_ms()).max(0) as u64;
                    std::time::Duration::from_millis(until)
                }
                // Nothing scheduled; park until a mutation wakes us.
                None => std::time::Duration::from_secs(24 * 60 * 60),
            };

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.rearm.notified() => continue,
                _ = tokio::time::sleep(delay) => {}
            }

            self.sweep().await;
        }
    }

    /// Run every due job once, then recompute next runs.
    async fn sweep(&self) {
        let due: Vec<Job> = {
            let mut inner = self.inner.lock().await;
            if !inner.running {
                return;
            }
            if let Err(e) = self.load_locked(&mut inner) {
                warn!(error = %e, "cron store reload failed");
                return;
            }
            let now = now_ms();
            inner
                .store
                .jobs
                .iter()
                .filter(|j| j.enabled && j.state.next_run_at_ms > 0 && now >= j.state.next_run_at_ms)
                .cloned()
                .collect()
        };

        for job in due {
            debug!(job = %job.id, name = %job.name, "cron job due");
            if let Err(e) = self.execute(job).await {
                warn!(error = %e, "cron job execution failed");
            }
        }
    }

    /// Run one job through the handler and record the outcome.
    async fn execute(&self, job: Job) -> Result<String, NightjarError> {
        let start = now_ms();
        let result = match &self.on_job {
            Some(handler) => handler(job.clone()).await,
            None => Ok(String::new()),
        };

        let mut inner = self.inner.lock().await;
        self.load_locked(&mut inner)?;
        if let Some(idx) = inner.store.jobs.iter().position(|j| j.id == job.id) {
            let updated = now_ms();
            {
                let j = &mut inner.store.jobs[idx];
                j.state.last_run_at_ms = start;
                match &result {
                    Ok(_) => {
                        j.state.last_status = "ok".into();
                        j.state.last_error.clear();
                    }
                    Err(e) => {
                        j.state.last_status = "error".into();
                        j.state.last_error = e.to_string();
                    }
                }
                j.updated_at_ms = updated;
            }

            // One-shot `at` jobs either disappear or go dormant after a run.
            if inner.store.jobs[idx].schedule.kind == ScheduleKind::At {
                if inner.store.jobs[idx].delete_after_run {
                    inner.store.jobs.remove(idx);
                } else {
                    let j = &mut inner.store.jobs[idx];
                    j.enabled = false;
                    j.state.next_run_at_ms = 0;
                }
            } else {
                let j = &mut inner.store.jobs[idx];
                j.state.next_run_at_ms = compute_next_run_ms(&j.schedule, updated);
            }
        }
        self.save_locked(&inner)?;
        drop(inner);
        self.rearm.notify_one();
        result
    }

    fn load_locked(&self, inner: &mut Inner) -> Result<(), NightjarError> {
        let raw = match std::fs::read_to_string(&self.store_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                inner.store = Store {
                    version: 1,
                    jobs: Vec::new(),
                };
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let mut store: Store = serde_json::from_str(&raw).map_err(|e| {
            NightjarError::Config(format!("parse {}: {e}", self.store_path.display()))
        })?;
        if store.version == 0 {
            store.version = 1;
        }
        inner.store = store;
        Ok(())
    }

    fn save_locked(&self, inner: &Inner) -> Result<(), NightjarError> {
        if let Some(parent) = self.store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut body = serde_json::to_string_pretty(&inner.store)
            .map_err(|e| NightjarError::Internal(format!("encode cron store: {e}")))?;
        body.push('\n');
        let tmp = self.store_path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.store_path)?;
        Ok(())
    }
}

fn next_wake_ms(store: &Store) -> Option<i64> {
    store
        .jobs
        .iter()
        .filter(|j| j.enabled && j.state.next_run_at_ms > 0)
        .map(|j| j.state.next_run_at_ms)
        .min()
}

/// Compute the next run for a schedule relative to `now` (unix ms).
/// Returns 0 when there is no future run.
pub fn compute_next_run_ms(schedule: &Schedule, now: i64) -> i64 {
    match schedule.kind {
        ScheduleKind::At => {
            if schedule.at_ms > now {
                schedule.at_ms
            } else {
                0
            }
        }
        ScheduleKind::Every => {
            if schedule.every_ms <= 0 {
                0
            } else {
                now + schedule.every_ms
            }
        }
        ScheduleKind::Cron => {
            let expr = schedule.expr.trim();
            if expr.is_empty() {
                return 0;
            }
            let Ok(parsed) = CronSchedule::parse(expr) else {
                return 0;
            };
            let Some(start) = Utc.timestamp_millis_opt(now).single() else {
                return 0;
            };
            match parsed.next(start.with_timezone(&Local)) {
                Some(next) => next.timestamp_millis(),
                None => 0,
            }
        }
    }
}

/// Reject schedules that can never produce a future run.
pub fn validate_schedule(schedule: &Schedule, now: i64) -> Result<(), NightjarError> {
    match schedule.kind {
        ScheduleKind::At => {
            if schedule.at_ms <= 0 {
                return Err(NightjarError::Schedule(
                    "at schedule requires a valid timestamp".into(),
                ));
            }
            if schedule.at_ms <= now {
                return Err(NightjarError::Schedule("at schedule must be in the future".into()));
            }
            Ok(())
        }
        ScheduleKind::Every => {
            if schedule.every_ms <= 0 {
                return Err(NightjarError::Schedule("every schedule requires everyMs > 0".into()));
            }
            Ok(())
        }
        ScheduleKind::Cron => {
            let expr = schedule.expr.trim();
            if expr.is_empty() {
                return Err(NightjarError::Schedule("cron schedule requires expr".into()));
            }
            CronSchedule::parse(expr).map(|_| ())
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
