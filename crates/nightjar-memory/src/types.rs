// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public search types and the manager trait consumed by the tool layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use nightjar_core::NightjarError;

/// Options for a hybrid search. Zero values fall back to configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub max_results: usize,
    pub min_score: f64,
}

/// One scored retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f64,
    pub snippet: String,
}

/// Options for reading a memory file slice. Zero values mean "whole file".
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// 1-based first line.
    pub from: usize,
    pub lines: usize,
}

/// Index health snapshot, surfaced by the `status` CLI command.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub db_path: String,
    pub files: usize,
    pub chunks: usize,
    pub vector_enabled: bool,
    pub vector_ready: bool,
    pub vector_dims: usize,
    pub fts_enabled: bool,
    pub fts_ready: bool,
    pub min_score: f64,
    pub max_results: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_error: String,
}

/// The retrieval surface exposed to the tool registry.
#[async_trait]
pub trait SearchManager: Send + Sync {
    /// Hybrid search over the indexed workspace memory.
    async fn search(
        &self,
        query: &str,
        opts: SearchOptions,
    ) -> Result<Vec<SearchResult>, NightjarError>;

    /// Read a validated memory file (or a line slice of it). Returns the
    /// text and the resolved workspace-relative path.
    async fn read_file(
        &self,
        rel_path: &str,
        opts: ReadOptions,
    ) -> Result<(String, String), NightjarError>;

    /// Reconcile the index with the on-disk Markdown set.
    async fn sync(&self, force: bool) -> Result<(), NightjarError>;

    /// Current index health.
    async fn status(&self) -> IndexStatus;
}
