// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The agent: turn loop, session store, subagents, consolidation,
//! heartbeat, and skills.
//!
//! [`AgentLoop`] consumes inbound messages from the bus, drives the LLM
//! tool loop against the registry, and publishes replies. Sessions persist
//! per conversation; when a session outgrows the memory window, a
//! background consolidation folds the oldest turns into a summary.
//! Subagents run a restricted tool set and announce completion through
//! the reserved `system` channel.

pub mod agent_loop;
pub mod consolidation;
pub mod heartbeat;
pub mod prompt;
pub mod session;
pub mod skills;
pub mod subagent;
pub mod turn;

pub use agent_loop::{AgentLoop, AgentLoopOptions};
pub use heartbeat::HeartbeatService;
pub use session::{Session, SessionManager, SessionMessage};
pub use skills::{SkillInfo, SkillLoader};
pub use subagent::SubagentManager;
