// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workspace-scoped hybrid memory index.
//!
//! Markdown files under `MEMORY.md`, `memory.md`, and `memory/**/*.md` are
//! chunked, embedded through an OpenAI-compatible `/embeddings` endpoint,
//! and indexed twice: Float32 vectors in a `sqlite-vec` vec0 table and raw
//! text in an FTS5 table. Queries fuse vector cosine scores with BM25
//! keyword scores. An embedding cache keyed by chunk hash and provider
//! fingerprint makes re-syncs cheap; a meta fingerprint resets the whole
//! index when the provider, model, or chunking parameters change.

pub mod chunker;
pub mod embed;
pub mod index;
pub mod notes;
pub mod types;

pub use index::IndexManager;
pub use types::{IndexStatus, ReadOptions, SearchManager, SearchOptions, SearchResult};
