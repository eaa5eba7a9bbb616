// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem tools: read_file, write_file, edit_file, list_dir.
//!
//! With `restrict_to_workspace` set, every path must resolve inside the
//! workspace root after lexical normalization.

use std::path::{Component, Path, PathBuf};

use nightjar_core::NightjarError;

use crate::Registry;

impl Registry {
    pub(crate) fn read_file(&self, path: &str) -> Result<String, NightjarError> {
        let abs = self.resolve_path(path)?;
        std::fs::read_to_string(&abs)
            .map_err(|e| NightjarError::Tool(format!("read {}: {e}", abs.display())))
    }

    pub(crate) fn write_file(&self, path: &str, content: &str) -> Result<String, NightjarError> {
        let abs = self.resolve_path(path)?;
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| NightjarError::Tool(format!("mkdir {}: {e}", parent.display())))?;
        }
        std::fs::write(&abs, content)
            .map_err(|e| NightjarError::Tool(format!("write {}: {e}", abs.display())))?;
        Ok(format!("Wrote {} bytes to {}", content.len(), path.trim()))
    }

    /// Replace the single occurrence of `old_text`; zero or multiple
    /// matches are errors so edits stay unambiguous.
    pub(crate) fn edit_file_replace(
        &self,
        path: &str,
        old_text: &str,
        new_text: &str,
    ) -> Result<String, NightjarError> {
        if old_text.is_empty() {
            return Err(NightjarError::Tool("old_text is empty".into()));
        }
        let abs = self.resolve_path(path)?;
        let content = std::fs::read_to_string(&abs)
            .map_err(|e| NightjarError::Tool(format!("read {}: {e}", abs.display())))?;

        let matches = content.matches(old_text).count();
        if matches == 0 {
            return Err(NightjarError::Tool("old_text not found in file".into()));
        }
        if matches > 1 {
            return Err(NightjarError::Tool(format!(
                "old_text matches {matches} times; provide more context to make it unique"
            )));
        }
        let updated = content.replacen(old_text, new_text, 1);
        std::fs::write(&abs, updated)
            .map_err(|e| NightjarError::Tool(format!("write {}: {e}", abs.display())))?;
        Ok(format!("Edited {}", path.trim()))
    }

    /// Back-compat line-range edit: replace 1-based inclusive lines
    /// `start..=end` with `new_text`.
    pub(crate) fn edit_file_lines(
        &self,
        path: &str,
        start_line: usize,
        end_line: usize,
        new_text: &str,
    ) -> Result<String, NightjarError> {
        if start_line == 0 || end_line < start_line {
            return Err(NightjarError::Tool("invalid line range".into()));
        }
        let abs = self.resolve_path(path)?;
        let content = std::fs::read_to_string(&abs)
            .map_err(|e| NightjarError::Tool(format!("read {}: {e}", abs.display())))?;
        let lines: Vec<&str> = content.split('\n').collect();
        if start_line > lines.len() {
            return Err(NightjarError::Tool(format!(
                "startLine {start_line} beyond end of file ({} lines)",
                lines.len()
            )));
        }
        let end = end_line.min(lines.len());

        let mut out: Vec<&str> = Vec::with_capacity(lines.len());
        out.extend_from_slice(&lines[..start_line - 1]);
        out.push(new_text);
        out.extend_from_slice(&lines[end..]);
        std::fs::write(&abs, out.join("\n"))
            .map_err(|e| NightjarError::Tool(format!("write {}: {e}", abs.display())))?;
        Ok(format!("Edited {} lines {start_line}-{end}", path.trim()))
    }

    pub(crate) fn list_dir(
        &self,
        path: &str,
        recursive: bool,
        max_entries: usize,
    ) -> Result<String, NightjarError> {
        let max_entries = if max_entries == 0 { 200 } else { max_entries };
        let abs = self.resolve_path(path)?;

        let mut names: Vec<String> = Vec::new();
        let mut truncated = false;
        collect_entries(&abs, &abs, recursive, max_entries, &mut names, &mut truncated)?;
        names.sort();
        let mut out = names.join("\n");
        if truncated {
            out.push_str("\n...(truncated)");
        }
        if out.is_empty() {
            out = "(empty)".into();
        }
        Ok(out)
    }

    /// Resolve a tool path against the workspace, enforcing containment
    /// when restricted.
    pub(crate) fn resolve_path(&self, path: &str) -> Result<PathBuf, NightjarError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(NightjarError::Tool("path is empty".into()));
        }
        let joined = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.workspace_dir.join(path)
        };
        let cleaned = clean_path(&joined);
        if self.restrict_to_workspace {
            let root = clean_path(&self.workspace_dir);
            if !cleaned.starts_with(&root) {
                return Err(NightjarError::Tool(format!(
                    "path outside workspace: {path}"
                )));
            }
        }
        Ok(cleaned)
    }
}

fn collect_entries(
    root: &Path,
    dir: &Path,
    recursive: bool,
    max_entries: usize,
    names: &mut Vec<String>,
    truncated: &mut bool,
) -> Result<(), NightjarError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| NightjarError::Tool(format!("list {}: {e}", dir.display())))?;
    for entry in entries.flatten() {
        if names.len() >= max_entries {
            *truncated = true;
            return Ok(());
        }
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        names.push(if is_dir { format!("{rel}/") } else { rel });
        if recursive && is_dir {
            collect_entries(root, &path, recursive, max_entries, names, truncated)?;
        }
    }
    Ok(())
}

/// Lexically normalize a path (resolve `.` and `..`).
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(dir: &tempfile::TempDir) -> Registry {
        Registry::new(dir.path())
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let r = registry(&dir);
        r.write_file("notes/today.md", "hello").unwrap();
        assert_eq!(r.read_file("notes/today.md").unwrap(), "hello");
    }

    #[test]
    fn restricted_paths_cannot_escape_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let r = registry(&dir);
        assert!(r.resolve_path("../outside.txt").is_err());
        assert!(r.resolve_path("a/../../outside.txt").is_err());
        assert!(r.resolve_path("/etc/passwd").is_err());
        assert!(r.resolve_path("a/../inside.txt").is_ok());
    }

    #[test]
    fn unrestricted_registry_allows_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = registry(&dir);
        r.restrict_to_workspace = false;
        assert!(r.resolve_path("/etc/hostname").is_ok());
    }

    #[test]
    fn edit_requires_exactly_one_match() {
        let dir = tempfile::tempdir().unwrap();
        let r = registry(&dir);
        r.write_file("f.txt", "aaa bbb aaa").unwrap();

        let err = r.edit_file_replace("f.txt", "aaa", "ccc").unwrap_err();
        assert!(err.to_string().contains("2 times"), "got: {err}");

        let err = r.edit_file_replace("f.txt", "zzz", "ccc").unwrap_err();
        assert!(err.to_string().contains("not found"));

        r.edit_file_replace("f.txt", "bbb", "ccc").unwrap();
        assert_eq!(r.read_file("f.txt").unwrap(), "aaa ccc aaa");
    }

    #[test]
    fn line_range_edit_replaces_inclusive_span() {
        let dir = tempfile::tempdir().unwrap();
        let r = registry(&dir);
        r.write_file("f.txt", "one\ntwo\nthree\nfour").unwrap();

        r.edit_file_lines("f.txt", 2, 3, "TWO+THREE").unwrap();
        assert_eq!(r.read_file("f.txt").unwrap(), "one\nTWO+THREE\nfour");

        assert!(r.edit_file_lines("f.txt", 0, 1, "x").is_err());
        assert!(r.edit_file_lines("f.txt", 9, 9, "x").is_err());
    }

    #[test]
    fn list_dir_names_only_with_cap() {
        let dir = tempfile::tempdir().unwrap();
        let r = registry(&dir);
        for i in 0..5 {
            r.write_file(&format!("d/file{i}.txt"), "x").unwrap();
        }

        let out = r.list_dir("d", false, 0).unwrap();
        assert_eq!(out.lines().count(), 5);
        assert!(out.contains("file0.txt"));

        let out = r.list_dir("d", false, 3).unwrap();
        assert!(out.contains("...(truncated)"));

        let out = r.list_dir(".", true, 0).unwrap();
        assert!(out.contains("d/"));
        assert!(out.contains("d/file0.txt"));
    }

    #[test]
    fn listing_missing_dir_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let r = registry(&dir);
        assert!(r.list_dir("nope", false, 0).is_err());
    }
}
