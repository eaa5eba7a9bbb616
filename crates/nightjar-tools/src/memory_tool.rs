// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory tools: memory_search and memory_get.
//!
//! Outputs are JSON blobs. Search failures degrade to
//! `{"results":[],"disabled":true,"error":"..."}` so the model can react
//! instead of the turn aborting.

use serde_json::json;

use nightjar_core::NightjarError;
use nightjar_memory::{ReadOptions, SearchOptions};

use crate::Registry;

impl Registry {
    pub(crate) async fn memory_search(
        &self,
        query: &str,
        max_results: Option<usize>,
        min_score: Option<f64>,
    ) -> Result<String, NightjarError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(r#"{"results":[]}"#.into());
        }
        let Some(memory) = &self.memory else {
            return Ok(r#"{"results":[],"disabled":true,"error":"memory search disabled"}"#.into());
        };

        let opts = SearchOptions {
            max_results: max_results.unwrap_or(0),
            min_score: min_score.unwrap_or(0.0),
        };
        match memory.search(query, opts).await {
            Ok(results) => {
                let status = memory.status().await;
                encode(&json!({
                    "results": results,
                    "provider": status.provider,
                    "model": status.model,
                }))
            }
            Err(e) => encode(&json!({
                "results": [],
                "disabled": true,
                "error": e.to_string(),
            })),
        }
    }

    pub(crate) async fn memory_get(
        &self,
        path: &str,
        from: Option<usize>,
        lines: Option<usize>,
    ) -> Result<String, NightjarError> {
        let Some(memory) = &self.memory else {
            return Ok(
                r#"{"path":"","text":"","disabled":true,"error":"memory search disabled"}"#.into(),
            );
        };
        let opts = ReadOptions {
            from: from.unwrap_or(0),
            lines: lines.unwrap_or(0),
        };
        match memory.read_file(path, opts).await {
            Ok((text, resolved)) => encode(&json!({ "path": resolved, "text": text })),
            Err(e) => encode(&json!({
                "path": path.trim(),
                "text": "",
                "disabled": true,
                "error": e.to_string(),
            })),
        }
    }
}

fn encode(value: &serde_json::Value) -> Result<String, NightjarError> {
    serde_json::to_string(value).map_err(|e| NightjarError::Internal(format!("encode output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nightjar_memory::{IndexStatus, SearchManager, SearchResult};
    use std::sync::Arc;

    /// Canned search manager for registry tests.
    struct StubMemory {
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl SearchManager for StubMemory {
        async fn search(
            &self,
            _query: &str,
            _opts: SearchOptions,
        ) -> Result<Vec<SearchResult>, NightjarError> {
            Ok(self.results.clone())
        }

        async fn read_file(
            &self,
            rel_path: &str,
            _opts: ReadOptions,
        ) -> Result<(String, String), NightjarError> {
            if rel_path.contains("..") {
                return Err(NightjarError::Tool("path outside memory".into()));
            }
            Ok(("note text".into(), rel_path.to_string()))
        }

        async fn sync(&self, _force: bool) -> Result<(), NightjarError> {
            Ok(())
        }

        async fn status(&self) -> IndexStatus {
            IndexStatus {
                enabled: true,
                provider: "openai".into(),
                model: "text-embedding-3-small".into(),
                ..Default::default()
            }
        }
    }

    fn registry_with_memory(dir: &tempfile::TempDir, results: Vec<SearchResult>) -> Registry {
        let mut registry = Registry::new(dir.path());
        registry.memory = Some(Arc::new(StubMemory { results }));
        registry
    }

    #[tokio::test]
    async fn search_returns_results_with_provider_info() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_memory(
            &dir,
            vec![SearchResult {
                path: "memory/2026-02-14.md".into(),
                start_line: 1,
                end_line: 3,
                score: 0.8,
                snippet: "sqlite vector search".into(),
            }],
        );

        let out = registry.memory_search("sqlite", None, None).await.unwrap();
        let blob: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(blob["results"][0]["path"], "memory/2026-02-14.md");
        assert_eq!(blob["results"][0]["startLine"], 1);
        assert_eq!(blob["provider"], "openai");
        assert_eq!(blob["model"], "text-embedding-3-small");
    }

    #[tokio::test]
    async fn empty_query_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_memory(&dir, vec![]);
        assert_eq!(registry.memory_search("  ", None, None).await.unwrap(), r#"{"results":[]}"#);
    }

    #[tokio::test]
    async fn unconfigured_memory_reports_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path());

        let out = registry.memory_search("anything", None, None).await.unwrap();
        let blob: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(blob["disabled"], true);

        let out = registry.memory_get("MEMORY.md", None, None).await.unwrap();
        let blob: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(blob["disabled"], true);
    }

    #[tokio::test]
    async fn get_returns_resolved_path_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_memory(&dir, vec![]);
        let out = registry.memory_get("memory/x.md", Some(1), Some(2)).await.unwrap();
        let blob: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(blob["path"], "memory/x.md");
        assert_eq!(blob["text"], "note text");
    }

    #[tokio::test]
    async fn get_surfaces_validation_errors_in_blob() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_memory(&dir, vec![]);
        let out = registry.memory_get("../secret.md", None, None).await.unwrap();
        let blob: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(blob["disabled"], true);
        assert!(blob["error"].as_str().unwrap().contains("outside"));
    }
}
