// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System prompt assembly.
//!
//! Deterministic layout: fixed header, current time, workspace, optional
//! safety note, session identity, recognized bootstrap files, the memory
//! note context, then a compact skills summary.

use std::path::Path;

use chrono::Local;

use nightjar_config::Config;
use nightjar_memory::notes::note_context;

use crate::skills::SkillLoader;

/// Workspace files concatenated into the prompt when present.
const BOOTSTRAP_FILES: [&str; 5] = ["AGENTS.md", "SOUL.md", "USER.md", "TOOLS.md", "IDENTITY.md"];

pub fn build_system_prompt(
    cfg: &Config,
    workspace: &Path,
    channel: &str,
    chat_id: &str,
    skills: Option<&SkillLoader>,
) -> String {
    let mut b = String::new();
    b.push_str("# nightjar\n\n");
    b.push_str("You are nightjar, a helpful AI assistant.\n");
    b.push_str("You can use tools to read/write/edit files, list directories, execute shell commands, fetch/search the web, schedule tasks, and spawn background subagents.\n\n");
    b.push_str("IMPORTANT: When replying to the current conversation, respond with plain text. Do not call the message tool.\n");
    b.push_str("Only use the message tool when you must send to a different channel/chat_id.\n\n");

    b.push_str("## Current Time\n");
    b.push_str(&Local::now().format("%Y-%m-%d %H:%M (%a)").to_string());
    b.push_str("\n\n## Workspace\n");
    b.push_str(&workspace.to_string_lossy());
    b.push_str("\n\n");

    if cfg.tools.restrict_to_workspace_value() {
        b.push_str("## Safety\nTools are restricted to the workspace directory.\n\n");
    }
    if !channel.is_empty() && !chat_id.is_empty() {
        b.push_str("## Current Session\n");
        b.push_str(&format!("Channel: {channel}\nChat ID: {chat_id}\n\n"));
    }

    for name in BOOTSTRAP_FILES {
        let path = workspace.join(name);
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }
        b.push_str(&format!("## {name}\n\n"));
        b.push_str(&content);
        if !content.ends_with('\n') {
            b.push('\n');
        }
        b.push('\n');
    }

    let memory = note_context(workspace);
    if !memory.trim().is_empty() {
        b.push_str("# Memory\n\n");
        b.push_str(&memory);
        b.push_str("\n\n");
    }

    if let Some(skills) = skills {
        let summary = skills.summary_xml();
        if !summary.is_empty() {
            b.push_str("# Skills\n\n");
            b.push_str("To use a skill:\n- workspace skills: read_file(path)\n- bundled skills: read_skill(name)\n\n");
            b.push_str(&summary);
            b.push_str("\n\n");
        }
    }

    b
}

/// System prompt for a spawned subagent.
pub fn build_subagent_prompt(workspace: &Path, task: &str) -> String {
    format!(
        "# Subagent\n\n\
         You are a subagent spawned by the main agent to complete a specific task.\n\n\
         ## Your Task\n{}\n\n\
         ## Rules\n\
         1. Stay focused: complete only the assigned task\n\
         2. Do not initiate conversations or take on side tasks\n\
         3. Be concise but informative\n\
         4. Do not use tools that are not available\n\n\
         ## Workspace\n{}\n\n\
         When you have completed the task, provide a clear summary of your findings or actions.",
        task.trim(),
        workspace.to_string_lossy().trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_header_time_and_workspace() {
        let ws = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        let prompt = build_system_prompt(&cfg, ws.path(), "cli", "direct", None);

        assert!(prompt.starts_with("# nightjar\n"));
        assert!(prompt.contains("## Current Time"));
        assert!(prompt.contains(&*ws.path().to_string_lossy()));
        assert!(prompt.contains("## Safety"));
        assert!(prompt.contains("Channel: cli"));
        assert!(prompt.contains("Chat ID: direct"));
    }

    #[test]
    fn safety_note_follows_restriction_flag() {
        let ws = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.tools.restrict_to_workspace = Some(false);
        let prompt = build_system_prompt(&cfg, ws.path(), "", "", None);
        assert!(!prompt.contains("## Safety"));
        assert!(!prompt.contains("## Current Session"));
    }

    #[test]
    fn bootstrap_files_are_concatenated_in_order() {
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(ws.path().join("SOUL.md"), "Be kind.").unwrap();
        std::fs::write(ws.path().join("USER.md"), "The user is Sam.\n").unwrap();

        let cfg = Config::default();
        let prompt = build_system_prompt(&cfg, ws.path(), "cli", "direct", None);
        let soul = prompt.find("## SOUL.md").unwrap();
        let user = prompt.find("## USER.md").unwrap();
        assert!(soul < user);
        assert!(prompt.contains("Be kind."));
        assert!(prompt.contains("The user is Sam."));
        assert!(!prompt.contains("## AGENTS.md"));
    }

    #[test]
    fn memory_section_appears_when_notes_exist() {
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(ws.path().join("MEMORY.md"), "- remember this\n").unwrap();
        let cfg = Config::default();
        let prompt = build_system_prompt(&cfg, ws.path(), "cli", "direct", None);
        assert!(prompt.contains("# Memory"));
        assert!(prompt.contains("remember this"));
    }

    #[test]
    fn skills_summary_is_appended() {
        let ws = tempfile::tempdir().unwrap();
        let dir = ws.path().join("skills").join("weather");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), "---\ndescription: forecast\n---\n").unwrap();

        let cfg = Config::default();
        let loader = SkillLoader::new(ws.path());
        let prompt = build_system_prompt(&cfg, ws.path(), "cli", "direct", Some(&loader));
        assert!(prompt.contains("# Skills"));
        assert!(prompt.contains("<name>weather</name>"));
    }

    #[test]
    fn subagent_prompt_embeds_task_and_workspace() {
        let prompt = build_subagent_prompt(Path::new("/tmp/ws"), "  summarize logs  ");
        assert!(prompt.starts_with("# Subagent"));
        assert!(prompt.contains("summarize logs"));
        assert!(prompt.contains("/tmp/ws"));
    }
}
