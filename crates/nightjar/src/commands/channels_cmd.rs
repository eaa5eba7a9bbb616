// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nightjar channels status`.

use nightjar_core::NightjarError;

use super::load_config;

pub fn status() -> Result<(), NightjarError> {
    let cfg = load_config()?;

    let rows = [
        (
            "telegram",
            cfg.channels.telegram.enabled,
            !cfg.channels.telegram.token.trim().is_empty(),
            cfg.channels.telegram.allow_from.len(),
        ),
        (
            "discord",
            cfg.channels.discord.enabled,
            !cfg.channels.discord.token.trim().is_empty(),
            cfg.channels.discord.allow_from.len(),
        ),
        (
            "slack",
            cfg.channels.slack.enabled,
            !cfg.channels.slack.bot_token.trim().is_empty()
                && !cfg.channels.slack.app_token.trim().is_empty(),
            cfg.channels.slack.allow_from.len(),
        ),
        (
            "whatsapp",
            cfg.channels.whatsapp.enabled,
            !cfg.channels.whatsapp.session_store_path.trim().is_empty(),
            cfg.channels.whatsapp.allow_from.len(),
        ),
    ];

    for (name, enabled, credentialed, allow_count) in rows {
        let state = match (enabled, credentialed) {
            (false, _) => "disabled",
            (true, false) => "enabled (missing credentials)",
            (true, true) => "enabled",
        };
        let allow = if allow_count == 0 {
            "allow all".to_string()
        } else {
            format!("{allow_count} allowed senders")
        };
        println!("{name}: {state}, {allow}");
    }
    Ok(())
}
