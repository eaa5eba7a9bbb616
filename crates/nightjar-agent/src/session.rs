// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation message history.
//!
//! One JSON file per session key under the sessions directory. Writes are
//! atomic (tmp + rename). The manager hands out one shared handle per key
//! so concurrent turns on the same conversation serialize on its lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use nightjar_core::NightjarError;

/// One message in a session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
    /// Unix milliseconds.
    pub ts: i64,
}

/// A persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Count of messages folded into `summary` so far.
    #[serde(default)]
    pub last_consolidated_index: usize,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Session {
            key: key.into(),
            messages: Vec::new(),
            summary: None,
            last_consolidated_index: 0,
        }
    }

    pub fn add(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.messages.push(SessionMessage {
            role: role.into(),
            content: content.into(),
            tools_used: None,
            ts: chrono::Utc::now().timestamp_millis(),
        });
    }

    pub fn add_with_tools(
        &mut self,
        role: impl Into<String>,
        content: impl Into<String>,
        tools_used: Vec<String>,
    ) {
        self.messages.push(SessionMessage {
            role: role.into(),
            content: content.into(),
            tools_used: if tools_used.is_empty() {
                None
            } else {
                Some(tools_used)
            },
            ts: chrono::Utc::now().timestamp_millis(),
        });
    }

    /// The trailing `n` messages.
    pub fn history(&self, n: usize) -> &[SessionMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn needs_consolidation(&self, memory_window: usize) -> bool {
        memory_window > 0 && self.messages.len() >= memory_window
    }
}

/// Session store handing out shared per-key handles.
pub struct SessionManager {
    dir: PathBuf,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    pub fn new(dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(SessionManager {
            dir: dir.into(),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Shared handle for a session, loading it from disk on first access.
    pub async fn get_or_create(
        &self,
        key: &str,
    ) -> Result<Arc<Mutex<Session>>, NightjarError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(key) {
            return Ok(Arc::clone(handle));
        }
        let session = match self.load(key)? {
            Some(session) => session,
            None => Session::new(key),
        };
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(key.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Load a session file without caching. Returns `None` when absent.
    pub fn load(&self, key: &str) -> Result<Option<Session>, NightjarError> {
        let path = self.session_path(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let session: Session = serde_json::from_str(&raw)
            .map_err(|e| NightjarError::Config(format!("parse {}: {e}", path.display())))?;
        Ok(Some(session))
    }

    /// Write a session atomically.
    pub fn save(&self, session: &Session) -> Result<(), NightjarError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.session_path(&session.key);
        let mut body = serde_json::to_string_pretty(session)
            .map_err(|e| NightjarError::Internal(format!("encode session: {e}")))?;
        body.push('\n');
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn session_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Map a session key to a filesystem-safe file stem.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path());

        let handle = manager.get_or_create("cli:default").await.unwrap();
        {
            let mut session = handle.lock().await;
            session.add("user", "What is 2+2?");
            session.add_with_tools("assistant", "4", vec!["exec".into()]);
            manager.save(&session).unwrap();
        }

        // A fresh manager sees the persisted state.
        let reopened = SessionManager::new(dir.path());
        let loaded = reopened.load("cli:default").unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].role, "user");
        assert_eq!(loaded.messages[1].content, "4");
        assert_eq!(loaded.messages[1].tools_used, Some(vec!["exec".to_string()]));
    }

    #[tokio::test]
    async fn same_key_shares_a_handle() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path());

        let a = manager.get_or_create("telegram:42").await.unwrap();
        a.lock().await.add("user", "hello");
        let b = manager.get_or_create("telegram:42").await.unwrap();
        assert_eq!(b.lock().await.messages.len(), 1);
    }

    #[test]
    fn history_returns_trailing_window() {
        let mut session = Session::new("k");
        for i in 0..10 {
            session.add("user", format!("m{i}"));
        }
        let window = session.history(3);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].content, "m7");
        assert_eq!(window[2].content, "m9");
        assert_eq!(session.history(100).len(), 10);
    }

    #[test]
    fn consolidation_trigger_uses_window() {
        let mut session = Session::new("k");
        for _ in 0..4 {
            session.add("user", "x");
        }
        assert!(!session.needs_consolidation(5));
        session.add("user", "x");
        assert!(session.needs_consolidation(5));
        assert!(!session.needs_consolidation(0));
    }

    #[test]
    fn keys_map_to_safe_file_names() {
        assert_eq!(sanitize_key("telegram:42"), "telegram:42");
        assert_eq!(sanitize_key("a/b\\c d"), "a_b_c_d");
    }

    #[tokio::test]
    async fn save_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        let mut session = Session::new("cli:x");
        session.add("user", "hi");
        manager.save(&session).unwrap();

        let entries: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["cli:x.json".to_string()]);
    }
}
