// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workspace note context for the system prompt.
//!
//! Long-term memory lives in `<workspace>/MEMORY.md`; daily notes live in
//! `<workspace>/memory/YYYY-MM-DD.md`. Both are injected verbatim into the
//! agent's system prompt when present.

use std::path::Path;

use chrono::Local;

/// Maximum bytes of note context injected into the prompt.
const MAX_CONTEXT_BYTES: usize = 16 * 1024;

/// Concatenated long-term memory plus today's daily note, or an empty
/// string when neither exists.
pub fn note_context(workspace: &Path) -> String {
    let mut out = String::new();

    if let Some(long_term) = read_note(&workspace.join("MEMORY.md")) {
        out.push_str("## Long-term Memory (MEMORY.md)\n\n");
        out.push_str(&long_term);
        out.push('\n');
    }

    let today = Local::now().format("%Y-%m-%d").to_string();
    let daily_rel = format!("memory/{today}.md");
    if let Some(daily) = read_note(&workspace.join(&daily_rel)) {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("## Today ({daily_rel})\n\n"));
        out.push_str(&daily);
        out.push('\n');
    }

    if out.len() > MAX_CONTEXT_BYTES {
        let mut end = MAX_CONTEXT_BYTES;
        while end > 0 && !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
    }
    out
}

fn read_note(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    if content.trim().is_empty() {
        return None;
    }
    Some(content.trim_end().to_string())
}
