// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent, crash-safe cron scheduler.
//!
//! Jobs live in a single JSON store written atomically. A timer task is
//! armed to the earliest future run time across enabled jobs; each fire
//! sweeps all due jobs into the injected handler and recomputes their next
//! run. Schedules come in three kinds: one-shot `at`, periodic `every`,
//! and 5-field `cron` expressions.

pub mod expr;
pub mod service;

pub use expr::CronSchedule;
pub use service::{Job, JobHandler, JobState, Payload, Schedule, ScheduleKind, Service, Store};
