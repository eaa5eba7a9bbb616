// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-schema declarations for every built-in tool.

use nightjar_llm::{FunctionDefinition, JsonSchema, ToolDefinition};

fn def(name: &str, description: &str, parameters: JsonSchema) -> ToolDefinition {
    ToolDefinition::function(FunctionDefinition {
        name: name.into(),
        description: description.into(),
        parameters,
    })
}

/// Assemble the definition list for the enabled capability set.
pub fn tool_definitions(
    skills: bool,
    web_search: bool,
    message: bool,
    spawn: bool,
    cron: bool,
    memory: bool,
) -> Vec<ToolDefinition> {
    let mut defs = vec![
        def(
            "read_file",
            "Read a UTF-8 text file from disk.",
            JsonSchema::object(
                vec![(
                    "path",
                    JsonSchema::string("File path (relative to workspace recommended)."),
                )],
                &["path"],
            ),
        ),
        def(
            "write_file",
            "Write a UTF-8 text file to disk (creates parent dirs).",
            JsonSchema::object(
                vec![
                    ("path", JsonSchema::string("")),
                    ("content", JsonSchema::string("")),
                ],
                &["path", "content"],
            ),
        ),
        def(
            "edit_file",
            "Edit a file by replacing old_text with new_text. old_text must appear exactly once.",
            JsonSchema::object(
                vec![
                    ("path", JsonSchema::string("")),
                    (
                        "old_text",
                        JsonSchema::string("Exact text to replace (must be unique)."),
                    ),
                    ("new_text", JsonSchema::string("Replacement text.")),
                ],
                &["path", "old_text", "new_text"],
            ),
        ),
        def(
            "list_dir",
            "List directory entries (names only).",
            JsonSchema::object(
                vec![
                    ("path", JsonSchema::string("")),
                    ("recursive", JsonSchema::boolean("")),
                    (
                        "maxEntries",
                        JsonSchema::integer("Limit results (default 200)."),
                    ),
                ],
                &["path"],
            ),
        ),
        def(
            "exec",
            "Execute a shell command in the workspace directory.",
            JsonSchema::object(vec![("command", JsonSchema::string(""))], &["command"]),
        ),
        def(
            "web_fetch",
            "Fetch a URL and extract readable content.",
            JsonSchema::object(
                vec![
                    ("url", JsonSchema::string("")),
                    ("extractMode", JsonSchema::string_enum(&["markdown", "text"])),
                    (
                        "maxChars",
                        JsonSchema::integer("Max characters in extracted text (default 50000)."),
                    ),
                ],
                &["url"],
            ),
        ),
    ];

    if skills {
        defs.push(def(
            "read_skill",
            "Read a bundled skill (SKILL.md) by name.",
            JsonSchema::object(vec![("name", JsonSchema::string(""))], &["name"]),
        ));
    }
    if web_search {
        defs.push(def(
            "web_search",
            "Search the web (Brave Search API). Returns titles, URLs, and snippets.",
            JsonSchema::object(
                vec![
                    ("query", JsonSchema::string("")),
                    ("count", JsonSchema::integer("")),
                ],
                &["query"],
            ),
        ));
    }
    if message {
        defs.push(def(
            "message",
            "Send a message to a specific channel/chat_id. Do not use for replying to the current conversation.",
            JsonSchema::object(
                vec![
                    ("content", JsonSchema::string("")),
                    ("channel", JsonSchema::string("")),
                    ("chat_id", JsonSchema::string("")),
                ],
                &["content", "channel", "chat_id"],
            ),
        ));
    }
    if spawn {
        defs.push(def(
            "spawn",
            "Spawn a subagent to handle a task in the background and report back.",
            JsonSchema::object(
                vec![
                    ("task", JsonSchema::string("")),
                    ("label", JsonSchema::string("")),
                ],
                &["task"],
            ),
        ));
    }
    if cron {
        defs.push(def(
            "cron",
            "Schedule reminders and recurring tasks. Actions: add, list, remove.",
            JsonSchema::object(
                vec![
                    ("action", JsonSchema::string_enum(&["add", "list", "remove"])),
                    ("message", JsonSchema::string("")),
                    ("every_seconds", JsonSchema::integer("")),
                    ("cron_expr", JsonSchema::string("")),
                    ("job_id", JsonSchema::string("")),
                ],
                &["action"],
            ),
        ));
    }
    if memory {
        defs.push(def(
            "memory_search",
            "Semantic memory search over MEMORY.md and memory/*.md.",
            JsonSchema::object(
                vec![
                    ("query", JsonSchema::string("")),
                    ("maxResults", JsonSchema::integer("")),
                    ("minScore", JsonSchema::number("")),
                ],
                &["query"],
            ),
        ));
        defs.push(def(
            "memory_get",
            "Read a safe snippet from MEMORY.md or memory/*.md.",
            JsonSchema::object(
                vec![
                    ("path", JsonSchema::string("")),
                    ("from", JsonSchema::integer("")),
                    ("lines", JsonSchema::integer("")),
                ],
                &["path"],
            ),
        ));
    }

    defs
}
