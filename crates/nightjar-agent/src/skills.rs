// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Skill discovery and progressive loading.
//!
//! A skill is a folder containing `SKILL.md`. Workspace skills live under
//! `<workspace>/skills/<name>/`; bundled skills can be registered by the
//! embedding binary and are shadowed by workspace skills of the same
//! name. Availability is computed from the YAML frontmatter `metadata`
//! field, whose JSON payload may list required CLI binaries and
//! environment variables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One discovered skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
    pub location: String,
    pub available: bool,
    pub requires: String,
    /// `"workspace"` or `"builtin"`.
    pub source: &'static str,
}

/// Loads skills from the workspace and an optional bundled set.
pub struct SkillLoader {
    workspace: PathBuf,
    builtin: Vec<(String, String)>,
}

impl SkillLoader {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        SkillLoader {
            workspace: workspace.into(),
            builtin: Vec::new(),
        }
    }

    /// Register bundled skills as `(name, SKILL.md content)` pairs.
    pub fn with_builtin(mut self, builtin: Vec<(String, String)>) -> Self {
        self.builtin = builtin;
        self
    }

    /// All skills, workspace entries shadowing bundled ones.
    pub fn list_all(&self) -> Vec<SkillInfo> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        let skills_dir = self.workspace.join("skills");
        if let Ok(entries) = std::fs::read_dir(&skills_dir) {
            let mut names: Vec<String> = entries
                .flatten()
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            for name in names {
                let path = skills_dir.join(&name).join("SKILL.md");
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                let meta = read_frontmatter(&content);
                let (description, available, requires) = summarize(&meta);
                out.push(SkillInfo {
                    name: name.clone(),
                    description,
                    location: path.to_string_lossy().into_owned(),
                    available,
                    requires,
                    source: "workspace",
                });
                seen.insert(name);
            }
        }

        for (name, content) in &self.builtin {
            if seen.contains(name) {
                continue;
            }
            let meta = read_frontmatter(content);
            let (description, available, requires) = summarize(&meta);
            out.push(SkillInfo {
                name: name.clone(),
                description,
                location: format!("builtin:{name}/SKILL.md"),
                available,
                requires,
                source: "builtin",
            });
        }

        out
    }

    /// Load a skill's SKILL.md, workspace first.
    pub fn load(&self, name: &str) -> Option<String> {
        let ws_path = self.workspace.join("skills").join(name).join("SKILL.md");
        if let Ok(content) = std::fs::read_to_string(&ws_path) {
            return Some(content);
        }
        self.builtin
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, content)| content.clone())
    }

    /// Compact XML listing for the system prompt.
    pub fn summary_xml(&self) -> String {
        let all = self.list_all();
        if all.is_empty() {
            return String::new();
        }
        let mut out = String::from("<skills>\n");
        for skill in all {
            out.push_str(&format!(
                "  <skill available=\"{}\">\n",
                if skill.available { "true" } else { "false" }
            ));
            out.push_str(&format!("    <name>{}</name>\n", escape_xml(&skill.name)));
            out.push_str(&format!(
                "    <description>{}</description>\n",
                escape_xml(&skill.description)
            ));
            out.push_str(&format!(
                "    <location>{}</location>\n",
                escape_xml(&skill.location)
            ));
            if !skill.available && !skill.requires.is_empty() {
                out.push_str(&format!(
                    "    <requires>{}</requires>\n",
                    escape_xml(&skill.requires)
                ));
            }
            out.push_str("  </skill>\n");
        }
        out.push_str("</skills>");
        out
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Parse `key: value` frontmatter between `---` fences.
fn read_frontmatter(content: &str) -> Vec<(String, String)> {
    let Some(rest) = content.strip_prefix("---\n") else {
        return Vec::new();
    };
    let Some(end) = rest.find("\n---\n") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for line in rest[..end].lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        out.push((
            key.trim().to_string(),
            value.trim().trim_matches(|c| c == '"' || c == '\'').to_string(),
        ));
    }
    out
}

fn meta_value<'a>(meta: &'a [(String, String)], key: &str) -> Option<&'a str> {
    meta.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Derive `(description, available, missing requirements)` from
/// frontmatter. The `metadata` value is JSON holding a `nightjar`
/// namespace with a `requires` object: `{"bins": [...], "env": [...]}`.
fn summarize(meta: &[(String, String)]) -> (String, bool, String) {
    let description = meta_value(meta, "description")
        .or_else(|| meta_value(meta, "name"))
        .unwrap_or_default()
        .to_string();

    let Some(raw) = meta_value(meta, "metadata") else {
        return (description, true, String::new());
    };
    let Ok(outer) = serde_json::from_str::<serde_json::Value>(raw) else {
        return (description, true, String::new());
    };
    let namespace = outer.get("nightjar").or_else(|| {
        // A single unknown namespace is accepted for older skills.
        outer.as_object().and_then(|map| {
            if map.len() == 1 {
                map.values().next()
            } else {
                None
            }
        })
    });
    let Some(requires) = namespace.and_then(|ns| ns.get("requires")) else {
        return (description, true, String::new());
    };

    let mut missing = Vec::new();
    if let Some(bins) = requires.get("bins").and_then(|v| v.as_array()) {
        for bin in bins {
            let Some(bin) = bin.as_str().filter(|s| !s.is_empty()) else {
                continue;
            };
            if !binary_on_path(bin) {
                missing.push(format!("CLI: {bin}"));
            }
        }
    }
    if let Some(envs) = requires.get("env").and_then(|v| v.as_array()) {
        for env in envs {
            let Some(env) = env.as_str().filter(|s| !s.is_empty()) else {
                continue;
            };
            if std::env::var(env).map_or(true, |v| v.is_empty()) {
                missing.push(format!("ENV: {env}"));
            }
        }
    }

    let available = missing.is_empty();
    (description, available, missing.join(", "))
}

fn binary_on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
