// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The incremental hybrid index manager.
//!
//! One SQLite database holds five tables: `files` (per-file content
//! hashes), `chunks` (chunk text + embedding JSON), `chunks_vec` (vec0
//! Float32 vectors), `chunks_fts` (FTS5 text), and `embedding_cache`
//! (fingerprint-keyed vectors). A `meta` row fingerprints the index
//! configuration; any mismatch triggers a full reset. One mutex serializes
//! sync and search so index mutations are never interleaved.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Once;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use nightjar_config::model::{
    Config, DEFAULT_MEMORY_CANDIDATE_MULTIPLIER, DEFAULT_MEMORY_CHUNK_TOKENS,
    DEFAULT_MEMORY_MAX_RESULTS, DEFAULT_MEMORY_MIN_SCORE, DEFAULT_MEMORY_TEXT_WEIGHT,
    DEFAULT_MEMORY_VECTOR_WEIGHT, DEFAULT_OPENAI_BASE_URL,
};
use nightjar_core::NightjarError;

use crate::chunker::{chunk_markdown, hash_text, Chunk};
use crate::embed::{vector_to_blob, EmbeddingProvider};
use crate::types::{IndexStatus, ReadOptions, SearchManager, SearchOptions, SearchResult};

const META_KEY: &str = "memory_index_meta_v1";
const VECTOR_TABLE: &str = "chunks_vec";
const FTS_TABLE: &str = "chunks_fts";
const CACHE_TABLE: &str = "embedding_cache";
const SNIPPET_MAX_CHARS: usize = 700;
const CANDIDATE_CAP: usize = 200;

static SQLITE_VEC_INIT: Once = Once::new();

type SqliteAutoExtensionFn = unsafe extern "C" fn(
    *mut rusqlite::ffi::sqlite3,
    *mut *const i8,
    *const rusqlite::ffi::sqlite3_api_routines,
) -> i32;

/// Register sqlite-vec for every connection opened by this process.
fn register_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        let init_fn_ptr = sqlite_vec::sqlite3_vec_init as *const ();
        let init_fn: SqliteAutoExtensionFn = std::mem::transmute(init_fn_ptr);
        rusqlite::ffi::sqlite3_auto_extension(Some(init_fn));
    });
}

fn storage_err(e: tokio_rusqlite::Error) -> NightjarError {
    NightjarError::Storage { source: Box::new(e) }
}

/// Effective memory-search settings after defaults and clamping.
#[derive(Debug, Clone)]
pub struct ResolvedSearchConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub headers: HashMap<String, String>,
    pub store_path: PathBuf,
    pub vector_enabled: bool,
    pub chunk_tokens: usize,
    pub chunk_overlap: usize,
    pub max_results: usize,
    pub min_score: f64,
    pub vector_weight: f64,
    pub text_weight: f64,
    pub candidate_multiplier: usize,
    pub cache_enabled: bool,
    pub cache_max: usize,
    pub sync_on_search: bool,
}

/// Resolve the raw config section against a workspace.
pub fn resolve_search_config(
    cfg: &Config,
    workspace: &Path,
) -> Result<ResolvedSearchConfig, NightjarError> {
    let raw = &cfg.agents.defaults.memory_search;

    let mut out = ResolvedSearchConfig {
        enabled: raw.enabled_value(),
        provider: {
            let p = raw.provider.trim().to_ascii_lowercase();
            if p.is_empty() {
                "openai".to_string()
            } else {
                p
            }
        },
        model: raw.model.trim().to_string(),
        base_url: raw.remote.base_url.trim().to_string(),
        api_key: raw.remote.api_key.trim().to_string(),
        headers: raw.remote.headers.clone(),
        store_path: PathBuf::new(),
        vector_enabled: raw.store.vector.enabled_value(),
        chunk_tokens: raw.chunking.tokens,
        chunk_overlap: raw.chunking.overlap,
        max_results: raw.query.max_results,
        min_score: raw.query.min_score.unwrap_or(DEFAULT_MEMORY_MIN_SCORE),
        vector_weight: raw
            .query
            .hybrid
            .vector_weight
            .unwrap_or(DEFAULT_MEMORY_VECTOR_WEIGHT),
        text_weight: raw
            .query
            .hybrid
            .text_weight
            .unwrap_or(DEFAULT_MEMORY_TEXT_WEIGHT),
        candidate_multiplier: raw.query.hybrid.candidate_multiplier,
        cache_enabled: raw.cache.enabled_value(),
        cache_max: raw.cache.max_entries,
        sync_on_search: raw.sync.on_search_value(),
    };

    if out.enabled {
        if out.model.is_empty() {
            return Err(NightjarError::Config(
                "agents.defaults.memorySearch.model is required when enabled".into(),
            ));
        }
        if out.provider != "openai" {
            return Err(NightjarError::Config(format!(
                "unsupported memorySearch.provider: {}",
                out.provider
            )));
        }
    }

    if out.base_url.is_empty() {
        out.base_url = DEFAULT_OPENAI_BASE_URL.to_string();
    }
    if out.api_key.is_empty() {
        let env = |k: &str| cfg.env.get(k).map(|v| v.trim().to_string()).unwrap_or_default();
        if out.base_url.to_ascii_lowercase().contains("openrouter.ai") {
            out.api_key = env("OPENROUTER_API_KEY");
        }
        if out.api_key.is_empty() {
            out.api_key = env("OPENAI_API_KEY");
        }
        if out.api_key.is_empty() {
            out.api_key = env("OPENROUTER_API_KEY");
        }
        if out.api_key.is_empty() {
            out.api_key = cfg.llm.api_key.trim().to_string();
        }
    }

    let raw_path = raw.store.path.trim();
    out.store_path = if raw_path.is_empty() {
        workspace.join(".memory").join("index.sqlite")
    } else {
        let expanded = raw_path.replace("{workspace}", &workspace.to_string_lossy());
        let p = PathBuf::from(expanded);
        if p.is_absolute() {
            p
        } else {
            workspace.join(p)
        }
    };

    if out.chunk_tokens == 0 {
        out.chunk_tokens = DEFAULT_MEMORY_CHUNK_TOKENS;
    }
    if out.chunk_overlap >= out.chunk_tokens {
        out.chunk_overlap = out.chunk_tokens - 1;
    }
    if out.max_results == 0 {
        out.max_results = DEFAULT_MEMORY_MAX_RESULTS;
    }
    out.min_score = out.min_score.clamp(0.0, 1.0);
    out.vector_weight = out.vector_weight.clamp(0.0, 1.0);
    out.text_weight = out.text_weight.clamp(0.0, 1.0);
    let sum = out.vector_weight + out.text_weight;
    if sum > 0.0 {
        out.vector_weight /= sum;
        out.text_weight /= sum;
    }
    if out.candidate_multiplier == 0 {
        out.candidate_multiplier = DEFAULT_MEMORY_CANDIDATE_MULTIPLIER;
    }

    Ok(out)
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexMeta {
    model: String,
    provider: String,
    provider_key: String,
    chunk_tokens: usize,
    chunk_overlap: usize,
    #[serde(default)]
    vector_dims: usize,
}

#[derive(Debug, Default)]
struct IndexState {
    vector_ready: bool,
    vector_dims: usize,
    fts_ready: bool,
    last_error: String,
}

struct FileEntry {
    rel_path: String,
    hash: String,
    size: i64,
    modified_ms: i64,
    content: String,
}

struct VectorHit {
    id: String,
    result: SearchResult,
    vector_score: f64,
}

struct KeywordHit {
    id: String,
    result: SearchResult,
    text_score: f64,
}

/// The index manager. Obtain through [`IndexManager::open`]; `None` when
/// memory search is disabled in the configuration.
pub struct IndexManager {
    workspace: PathBuf,
    cfg: ResolvedSearchConfig,
    provider: EmbeddingProvider,
    conn: Connection,
    state: Mutex<IndexState>,
}

impl IndexManager {
    pub async fn open(
        cfg: &Config,
        workspace: &Path,
    ) -> Result<Option<Arc<IndexManager>>, NightjarError> {
        let workspace = workspace
            .canonicalize()
            .unwrap_or_else(|_| workspace.to_path_buf());
        let resolved = resolve_search_config(cfg, &workspace)?;
        if !resolved.enabled {
            return Ok(None);
        }

        if let Some(parent) = resolved.store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        register_sqlite_vec();
        let conn = Connection::open(resolved.store_path.clone())
            .await
            .map_err(storage_err)?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;

        let provider = EmbeddingProvider::new(
            resolved.provider.clone(),
            resolved.base_url.trim_end_matches('/').to_string(),
            resolved.api_key.clone(),
            resolved.model.clone(),
            resolved.headers.clone(),
        )?;

        let manager = IndexManager {
            workspace,
            cfg: resolved,
            provider,
            conn,
            state: Mutex::new(IndexState::default()),
        };

        {
            let mut state = manager.state.lock().await;
            manager.ensure_schema(&mut state).await?;
            if let Some(meta) = manager.read_meta().await? {
                if meta.vector_dims > 0 {
                    state.vector_dims = meta.vector_dims;
                    state.vector_ready = manager.cfg.vector_enabled;
                }
            }
        }

        Ok(Some(Arc::new(manager)))
    }

    /// Workspace root this index covers.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    async fn ensure_schema(&self, state: &mut IndexState) -> Result<(), NightjarError> {
        let result = self
            .conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS meta (
                        key TEXT PRIMARY KEY,
                        value TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS files (
                        path TEXT PRIMARY KEY,
                        hash TEXT NOT NULL,
                        mtime INTEGER NOT NULL,
                        size INTEGER NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS chunks (
                        id TEXT PRIMARY KEY,
                        path TEXT NOT NULL,
                        start_line INTEGER NOT NULL,
                        end_line INTEGER NOT NULL,
                        hash TEXT NOT NULL,
                        model TEXT NOT NULL,
                        text TEXT NOT NULL,
                        embedding TEXT NOT NULL,
                        updated_at INTEGER NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);
                    CREATE TABLE IF NOT EXISTS embedding_cache (
                        provider TEXT NOT NULL,
                        model TEXT NOT NULL,
                        provider_key TEXT NOT NULL,
                        hash TEXT NOT NULL,
                        embedding TEXT NOT NULL,
                        dims INTEGER,
                        updated_at INTEGER NOT NULL,
                        PRIMARY KEY (provider, model, provider_key, hash)
                    );
                    CREATE INDEX IF NOT EXISTS idx_embedding_cache_updated_at
                        ON embedding_cache(updated_at);
                    CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                        text,
                        id UNINDEXED,
                        path UNINDEXED,
                        model UNINDEXED,
                        start_line UNINDEXED,
                        end_line UNINDEXED
                    );",
                )?;
                Ok(())
            })
            .await;
        match result {
            Ok(()) => {
                state.fts_ready = true;
                Ok(())
            }
            Err(e) => {
                state.fts_ready = false;
                state.last_error = e.to_string();
                Err(storage_err(e))
            }
        }
    }

    async fn read_meta(&self) -> Result<Option<IndexMeta>, NightjarError> {
        let raw: Option<String> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
                let raw = stmt
                    .query_row(rusqlite::params![META_KEY], |row| row.get::<_, String>(0))
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                Ok(raw)
            })
            .await
            .map_err(storage_err)?;
        Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    async fn write_meta(&self, meta: &IndexMeta) -> Result<(), NightjarError> {
        let value = serde_json::to_string(meta)
            .map_err(|e| NightjarError::Internal(format!("encode index meta: {e}")))?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO meta(key, value) VALUES(?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    rusqlite::params![META_KEY, value],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn ensure_vector_table(
        &self,
        state: &mut IndexState,
        dims: usize,
    ) -> Result<(), NightjarError> {
        if !self.cfg.vector_enabled || dims == 0 {
            return Ok(());
        }
        if state.vector_ready && state.vector_dims == dims {
            return Ok(());
        }
        let drop_existing = state.vector_dims > 0 && state.vector_dims != dims;
        let result = self
            .conn
            .call(move |conn| {
                if drop_existing {
                    let _ = conn.execute_batch("DROP TABLE IF EXISTS chunks_vec;");
                }
                conn.execute_batch(&format!(
                    "CREATE VIRTUAL TABLE IF NOT EXISTS {VECTOR_TABLE} USING vec0(
                        id TEXT PRIMARY KEY,
                        embedding FLOAT[{dims}]
                    );"
                ))?;
                Ok(())
            })
            .await;
        match result {
            Ok(()) => {
                state.vector_ready = true;
                state.vector_dims = dims;
                Ok(())
            }
            Err(e) => {
                state.vector_ready = false;
                state.last_error = e.to_string();
                Err(storage_err(e))
            }
        }
    }

    async fn reset_index(&self, state: &mut IndexState) -> Result<(), NightjarError> {
        let fts_ready = state.fts_ready;
        let had_vectors = state.vector_dims > 0;
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM files", [])?;
                conn.execute("DELETE FROM chunks", [])?;
                if fts_ready {
                    let _ = conn.execute(&format!("DELETE FROM {FTS_TABLE}"), []);
                }
                if had_vectors {
                    let _ = conn.execute_batch("DROP TABLE IF EXISTS chunks_vec;");
                }
                Ok(())
            })
            .await
            .map_err(storage_err)?;
        state.vector_dims = 0;
        state.vector_ready = false;
        Ok(())
    }

    async fn delete_path(&self, state: &IndexState, rel_path: &str) -> Result<(), NightjarError> {
        let vector_ready = state.vector_ready;
        let fts_ready = state.fts_ready;
        let model = self.cfg.model.clone();
        let rel = rel_path.to_string();
        self.conn
            .call(move |conn| {
                if vector_ready {
                    let _ = conn.execute(
                        &format!(
                            "DELETE FROM {VECTOR_TABLE}
                             WHERE id IN (SELECT id FROM chunks WHERE path = ?1)"
                        ),
                        rusqlite::params![rel],
                    );
                }
                if fts_ready {
                    let _ = conn.execute(
                        &format!("DELETE FROM {FTS_TABLE} WHERE path = ?1 AND model = ?2"),
                        rusqlite::params![rel, model],
                    );
                }
                conn.execute("DELETE FROM chunks WHERE path = ?1", rusqlite::params![rel])?;
                conn.execute("DELETE FROM files WHERE path = ?1", rusqlite::params![rel])?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn sync_locked(
        &self,
        state: &mut IndexState,
        force: bool,
    ) -> Result<(), NightjarError> {
        self.ensure_schema(state).await?;
        let meta = self.read_meta().await?;
        let provider_key = self.provider.provider_key();
        let need_full = force
            || match &meta {
                None => true,
                Some(meta) => {
                    meta.model != self.cfg.model
                        || meta.provider != self.cfg.provider
                        || meta.provider_key != provider_key
                        || meta.chunk_tokens != self.cfg.chunk_tokens
                        || meta.chunk_overlap != self.cfg.chunk_overlap
                }
            };
        if need_full {
            debug!("memory index fingerprint changed, rebuilding");
            self.reset_index(state).await?;
        }

        let files = list_memory_files(&self.workspace)?;
        let active: HashSet<String> = files.iter().map(|f| f.rel_path.clone()).collect();

        for file in files {
            let rel = file.rel_path.clone();
            let old_hash: Option<String> = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare("SELECT hash FROM files WHERE path = ?1")?;
                    let hash = stmt
                        .query_row(rusqlite::params![rel], |row| row.get::<_, String>(0))
                        .map(Some)
                        .or_else(|e| match e {
                            rusqlite::Error::QueryReturnedNoRows => Ok(None),
                            other => Err(other),
                        })?;
                    Ok(hash)
                })
                .await
                .map_err(storage_err)?;
            if !need_full && old_hash.as_deref() == Some(file.hash.as_str()) {
                continue;
            }
            self.index_file(state, file).await?;
        }

        let known: Vec<String> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT path FROM files")?;
                let paths = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(paths)
            })
            .await
            .map_err(storage_err)?;
        for path in known {
            if !active.contains(&path) {
                self.delete_path(state, &path).await?;
            }
        }

        self.write_meta(&IndexMeta {
            model: self.cfg.model.clone(),
            provider: self.cfg.provider.clone(),
            provider_key,
            chunk_tokens: self.cfg.chunk_tokens,
            chunk_overlap: self.cfg.chunk_overlap,
            vector_dims: state.vector_dims,
        })
        .await?;

        self.prune_embedding_cache().await?;
        Ok(())
    }

    async fn index_file(
        &self,
        state: &mut IndexState,
        entry: FileEntry,
    ) -> Result<(), NightjarError> {
        let chunks: Vec<Chunk> =
            chunk_markdown(&entry.content, self.cfg.chunk_tokens, self.cfg.chunk_overlap)
                .into_iter()
                .filter(|c| !c.text.trim().is_empty())
                .collect();

        let embeddings = self.embed_chunks_with_cache(&chunks).await?;
        let dims = embeddings.iter().find(|v| !v.is_empty()).map_or(0, |v| v.len());
        let vector_ok = if dims > 0 {
            self.ensure_vector_table(state, dims).await?;
            true
        } else {
            false
        };

        struct Row {
            id: String,
            start_line: i64,
            end_line: i64,
            hash: String,
            text: String,
            embedding_json: String,
            vector_blob: Option<Vec<u8>>,
        }

        let rows: Vec<Row> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(c, emb)| Row {
                id: hash_text(&format!(
                    "{}:{}:{}:{}:{}",
                    entry.rel_path, c.start_line, c.end_line, c.hash, self.cfg.model
                )),
                start_line: c.start_line as i64,
                end_line: c.end_line as i64,
                hash: c.hash.clone(),
                text: c.text.clone(),
                embedding_json: serde_json::to_string(emb).unwrap_or_else(|_| "[]".into()),
                vector_blob: if vector_ok && !emb.is_empty() {
                    Some(vector_to_blob(emb))
                } else {
                    None
                },
            })
            .collect();

        let rel = entry.rel_path.clone();
        let model = self.cfg.model.clone();
        let file_hash = entry.hash.clone();
        let mtime = entry.modified_ms;
        let size = entry.size;
        let fts_ready = state.fts_ready;
        let now = chrono::Utc::now().timestamp_millis();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if vector_ok {
                    let _ = tx.execute(
                        &format!(
                            "DELETE FROM {VECTOR_TABLE}
                             WHERE id IN (SELECT id FROM chunks WHERE path = ?1)"
                        ),
                        rusqlite::params![rel],
                    );
                }
                if fts_ready {
                    let _ = tx.execute(
                        &format!("DELETE FROM {FTS_TABLE} WHERE path = ?1 AND model = ?2"),
                        rusqlite::params![rel, model],
                    );
                }
                tx.execute("DELETE FROM chunks WHERE path = ?1", rusqlite::params![rel])?;

                for row in &rows {
                    tx.execute(
                        "INSERT INTO chunks
                             (id, path, start_line, end_line, hash, model, text, embedding, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                         ON CONFLICT(id) DO UPDATE SET
                             hash = excluded.hash,
                             model = excluded.model,
                             text = excluded.text,
                             embedding = excluded.embedding,
                             updated_at = excluded.updated_at",
                        rusqlite::params![
                            row.id,
                            rel,
                            row.start_line,
                            row.end_line,
                            row.hash,
                            model,
                            row.text,
                            row.embedding_json,
                            now
                        ],
                    )?;
                    if let Some(blob) = &row.vector_blob {
                        let _ = tx.execute(
                            &format!("DELETE FROM {VECTOR_TABLE} WHERE id = ?1"),
                            rusqlite::params![row.id],
                        );
                        tx.execute(
                            &format!(
                                "INSERT INTO {VECTOR_TABLE} (id, embedding) VALUES (?1, ?2)"
                            ),
                            rusqlite::params![row.id, blob],
                        )?;
                    }
                    if fts_ready {
                        let _ = tx.execute(
                            &format!(
                                "INSERT INTO {FTS_TABLE}
                                     (text, id, path, model, start_line, end_line)
                                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                            ),
                            rusqlite::params![
                                row.text,
                                row.id,
                                rel,
                                model,
                                row.start_line,
                                row.end_line
                            ],
                        );
                    }
                }

                tx.execute(
                    "INSERT INTO files(path, hash, mtime, size) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(path) DO UPDATE SET
                         hash = excluded.hash,
                         mtime = excluded.mtime,
                         size = excluded.size",
                    rusqlite::params![rel, file_hash, mtime, size],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn embed_chunks_with_cache(
        &self,
        chunks: &[Chunk],
    ) -> Result<Vec<Vec<f32>>, NightjarError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let mut result: Vec<Vec<f32>> = vec![Vec::new(); chunks.len()];
        let mut missing: Vec<usize> = Vec::new();

        let cache = if self.cfg.cache_enabled {
            self.load_embedding_cache(chunks).await?
        } else {
            HashMap::new()
        };
        for (i, chunk) in chunks.iter().enumerate() {
            match cache.get(&chunk.hash) {
                Some(vec) if !vec.is_empty() => result[i] = vec.clone(),
                _ => missing.push(i),
            }
        }
        if missing.is_empty() {
            return Ok(result);
        }

        let texts: Vec<String> = missing.iter().map(|&i| chunks[i].text.clone()).collect();
        let embedded = self.provider.embed_batch(&texts).await?;
        if embedded.len() != texts.len() {
            return Err(NightjarError::provider_msg(format!(
                "embedding count mismatch: got={} want={}",
                embedded.len(),
                texts.len()
            )));
        }

        let mut to_cache: Vec<(String, Vec<f32>)> = Vec::with_capacity(missing.len());
        for (slot, vec) in missing.iter().zip(embedded) {
            to_cache.push((chunks[*slot].hash.clone(), vec.clone()));
            result[*slot] = vec;
        }
        if self.cfg.cache_enabled {
            self.upsert_embedding_cache(to_cache).await?;
        }
        Ok(result)
    }

    async fn load_embedding_cache(
        &self,
        chunks: &[Chunk],
    ) -> Result<HashMap<String, Vec<f32>>, NightjarError> {
        let mut uniq: Vec<String> = Vec::with_capacity(chunks.len());
        let mut seen = HashSet::new();
        for chunk in chunks {
            if seen.insert(chunk.hash.clone()) {
                uniq.push(chunk.hash.clone());
            }
        }
        if uniq.is_empty() {
            return Ok(HashMap::new());
        }

        let provider = self.cfg.provider.clone();
        let model = self.cfg.model.clone();
        let provider_key = self.provider.provider_key();

        self.conn
            .call(move |conn| {
                let mut out = HashMap::new();
                const BATCH: usize = 400;
                for batch in uniq.chunks(BATCH) {
                    let placeholders = vec!["?"; batch.len()].join(",");
                    let sql = format!(
                        "SELECT hash, embedding FROM {CACHE_TABLE}
                         WHERE provider = ? AND model = ? AND provider_key = ? AND hash IN ({placeholders})"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let mut params: Vec<&dyn rusqlite::types::ToSql> =
                        vec![&provider, &model, &provider_key];
                    for hash in batch {
                        params.push(hash);
                    }
                    let rows = stmt.query_map(params.as_slice(), |row| {
                        let hash: String = row.get(0)?;
                        let raw: String = row.get(1)?;
                        Ok((hash, raw))
                    })?;
                    for row in rows {
                        let (hash, raw) = row?;
                        let vec: Vec<f32> = serde_json::from_str(&raw).unwrap_or_default();
                        out.insert(hash, vec);
                    }
                }
                Ok(out)
            })
            .await
            .map_err(storage_err)
    }

    async fn upsert_embedding_cache(
        &self,
        rows: Vec<(String, Vec<f32>)>,
    ) -> Result<(), NightjarError> {
        if rows.is_empty() {
            return Ok(());
        }
        let provider = self.cfg.provider.clone();
        let model = self.cfg.model.clone();
        let provider_key = self.provider.provider_key();
        let now = chrono::Utc::now().timestamp_millis();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(&format!(
                        "INSERT INTO {CACHE_TABLE}
                             (provider, model, provider_key, hash, embedding, dims, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                         ON CONFLICT(provider, model, provider_key, hash) DO UPDATE SET
                             embedding = excluded.embedding,
                             dims = excluded.dims,
                             updated_at = excluded.updated_at"
                    ))?;
                    for (hash, vec) in &rows {
                        let embedding = serde_json::to_string(vec).unwrap_or_else(|_| "[]".into());
                        stmt.execute(rusqlite::params![
                            provider,
                            model,
                            provider_key,
                            hash,
                            embedding,
                            vec.len() as i64,
                            now
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn prune_embedding_cache(&self) -> Result<(), NightjarError> {
        if !self.cfg.cache_enabled || self.cfg.cache_max == 0 {
            return Ok(());
        }
        let max = self.cfg.cache_max as i64;
        self.conn
            .call(move |conn| {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {CACHE_TABLE}"), [], |row| {
                        row.get(0)
                    })?;
                if count > max {
                    conn.execute(
                        &format!(
                            "DELETE FROM {CACHE_TABLE} WHERE rowid IN (
                                SELECT rowid FROM {CACHE_TABLE} ORDER BY updated_at ASC LIMIT ?1
                            )"
                        ),
                        rusqlite::params![count - max],
                    )?;
                }
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn search_vector(
        &self,
        state: &mut IndexState,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>, NightjarError> {
        if query_vec.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        self.ensure_vector_table(state, query_vec.len()).await?;
        if !state.vector_ready {
            return Ok(Vec::new());
        }

        let blob = vector_to_blob(query_vec);
        let model = self.cfg.model.clone();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.id, c.path, c.start_line, c.end_line, c.text,
                            vec_distance_cosine(v.embedding, ?1) AS dist
                       FROM {VECTOR_TABLE} v
                       JOIN chunks c ON c.id = v.id
                      WHERE c.model = ?2
                      ORDER BY dist ASC
                      LIMIT ?3"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![blob, model, limit as i64], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, f64>(5)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|(id, path, start_line, end_line, text, dist)| {
                let score = 1.0 - dist;
                VectorHit {
                    id,
                    result: SearchResult {
                        path,
                        start_line: start_line.max(0) as usize,
                        end_line: end_line.max(0) as usize,
                        score,
                        snippet: truncate_text(&text, SNIPPET_MAX_CHARS),
                    },
                    vector_score: score,
                }
            })
            .collect())
    }

    async fn search_keyword(
        &self,
        state: &IndexState,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KeywordHit>, NightjarError> {
        if !state.fts_ready || limit == 0 {
            return Ok(Vec::new());
        }
        let fts_query = build_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.cfg.model.clone();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, path, start_line, end_line, text, bm25({FTS_TABLE}) AS rank
                       FROM {FTS_TABLE}
                      WHERE {FTS_TABLE} MATCH ?1 AND model = ?2
                      ORDER BY rank ASC
                      LIMIT ?3"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![fts_query, model, limit as i64], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, f64>(5)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|(id, path, start_line, end_line, text, rank)| {
                let text_score = bm25_rank_to_score(rank);
                KeywordHit {
                    id,
                    result: SearchResult {
                        path,
                        start_line: start_line.max(0) as usize,
                        end_line: end_line.max(0) as usize,
                        score: text_score,
                        snippet: truncate_text(&text, SNIPPET_MAX_CHARS),
                    },
                    text_score,
                }
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SearchManager for IndexManager {
    async fn search(
        &self,
        query: &str,
        opts: SearchOptions,
    ) -> Result<Vec<SearchResult>, NightjarError> {
        let cleaned = query.trim();
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let max_results = if opts.max_results == 0 {
            self.cfg.max_results
        } else {
            opts.max_results
        };
        let min_score = if opts.min_score <= 0.0 {
            self.cfg.min_score
        } else {
            opts.min_score
        };
        let candidates = (max_results * self.cfg.candidate_multiplier)
            .max(max_results)
            .min(CANDIDATE_CAP);

        let mut state = self.state.lock().await;

        if self.cfg.sync_on_search {
            self.sync_locked(&mut state, false).await?;
        }

        let query_vec = match self.provider.embed_batch(&[cleaned.to_string()]).await {
            Ok(mut vecs) => vecs.drain(..).next().unwrap_or_default(),
            Err(e) => {
                state.last_error = e.to_string();
                return Err(e);
            }
        };

        let vector_hits = self.search_vector(&mut state, &query_vec, candidates).await?;
        let keyword_hits = self.search_keyword(&state, cleaned, candidates).await?;
        let merged = merge_hybrid(
            vector_hits,
            keyword_hits,
            self.cfg.vector_weight,
            self.cfg.text_weight,
        );
        Ok(clamp_results(merged, max_results, min_score))
    }

    async fn read_file(
        &self,
        rel_path: &str,
        opts: ReadOptions,
    ) -> Result<(String, String), NightjarError> {
        let raw = rel_path.trim();
        if raw.is_empty() {
            return Err(NightjarError::Tool("path required".into()));
        }
        let abs = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            self.workspace.join(raw)
        };
        let abs = clean_path(&abs);

        let rel = abs
            .strip_prefix(&self.workspace)
            .map_err(|_| NightjarError::Tool("path outside memory".into()))?;
        let rel = rel.to_string_lossy().replace('\\', "/");
        if rel.starts_with("../") || rel == ".." || !is_memory_path(&rel) {
            return Err(NightjarError::Tool("path outside memory".into()));
        }
        if !rel.to_ascii_lowercase().ends_with(".md") {
            return Err(NightjarError::Tool("only .md files are readable".into()));
        }
        let meta = std::fs::symlink_metadata(&abs)
            .map_err(|_| NightjarError::Tool("not a readable memory file".into()))?;
        if !meta.is_file() || meta.file_type().is_symlink() {
            return Err(NightjarError::Tool("not a readable memory file".into()));
        }

        let content = std::fs::read_to_string(&abs)?;
        if opts.from == 0 && opts.lines == 0 {
            return Ok((content, rel));
        }
        let lines: Vec<&str> = content.split('\n').collect();
        let start = opts.from.max(1);
        let count = if opts.lines == 0 { lines.len() } else { opts.lines };
        let from = (start - 1).min(lines.len());
        let to = (from + count).min(lines.len());
        Ok((lines[from..to].join("\n"), rel))
    }

    async fn sync(&self, force: bool) -> Result<(), NightjarError> {
        let mut state = self.state.lock().await;
        self.sync_locked(&mut state, force).await
    }

    async fn status(&self) -> IndexStatus {
        let state = self.state.lock().await;
        let mut out = IndexStatus {
            enabled: true,
            provider: self.cfg.provider.clone(),
            model: self.cfg.model.clone(),
            db_path: self.cfg.store_path.to_string_lossy().into_owned(),
            files: 0,
            chunks: 0,
            vector_enabled: self.cfg.vector_enabled,
            vector_ready: state.vector_ready,
            vector_dims: state.vector_dims,
            fts_enabled: true,
            fts_ready: state.fts_ready,
            min_score: self.cfg.min_score,
            max_results: self.cfg.max_results,
            last_error: state.last_error.clone(),
        };
        let counts = self
            .conn
            .call(|conn| {
                let files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
                let chunks: i64 =
                    conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
                Ok((files, chunks))
            })
            .await;
        if let Ok((files, chunks)) = counts {
            out.files = files.max(0) as usize;
            out.chunks = chunks.max(0) as usize;
        } else {
            warn!("memory index status counts unavailable");
        }
        out
    }
}

/// Lexically normalize a path (resolve `.` and `..` components).
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Enumerate the indexable Markdown files for a workspace: `MEMORY.md`,
/// `memory.md`, and everything under `memory/`, skipping symlinks.
fn list_memory_files(workspace: &Path) -> Result<Vec<FileEntry>, NightjarError> {
    let mut paths: Vec<PathBuf> = Vec::new();

    let mut add_if_file = |abs: PathBuf| {
        let Ok(meta) = std::fs::symlink_metadata(&abs) else {
            return;
        };
        if !meta.is_file() || meta.file_type().is_symlink() {
            return;
        }
        if !abs.to_string_lossy().to_ascii_lowercase().ends_with(".md") {
            return;
        }
        paths.push(abs);
    };

    add_if_file(workspace.join("MEMORY.md"));
    add_if_file(workspace.join("memory.md"));
    walk_memory_dir(&workspace.join("memory"), &mut add_if_file);

    // Dedup by canonical path; case-insensitive filesystems can surface
    // MEMORY.md and memory.md as the same file.
    let mut seen = HashSet::new();
    let mut out: Vec<FileEntry> = Vec::new();
    for abs in paths {
        let key = abs
            .canonicalize()
            .unwrap_or_else(|_| abs.clone())
            .to_string_lossy()
            .into_owned();
        if !seen.insert(key) {
            continue;
        }
        let Ok(meta) = std::fs::metadata(&abs) else {
            continue;
        };
        let content = std::fs::read_to_string(&abs)?;
        let Ok(rel) = abs.strip_prefix(workspace) else {
            continue;
        };
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_millis() as i64);
        out.push(FileEntry {
            rel_path: rel.to_string_lossy().replace('\\', "/"),
            hash: hash_text(&content),
            size: meta.len() as i64,
            modified_ms,
            content,
        });
    }
    out.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(out)
}

fn walk_memory_dir(dir: &Path, add: &mut impl FnMut(PathBuf)) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = std::fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.file_type().is_symlink() {
            continue;
        }
        if meta.is_dir() {
            walk_memory_dir(&path, add);
        } else {
            add(path);
        }
    }
}

/// Whether a workspace-relative path is inside the memory surface.
pub fn is_memory_path(rel: &str) -> bool {
    let normalized = rel.trim().trim_start_matches("./");
    normalized == "MEMORY.md" || normalized == "memory.md" || normalized.starts_with("memory/")
}

/// Build an FTS5 MATCH query: `[A-Za-z0-9_]+` tokens joined with AND as
/// quoted phrases.
pub fn build_fts_query(raw: &str) -> String {
    let re = regex::Regex::new(r"[A-Za-z0-9_]+").expect("static regex");
    let parts: Vec<String> = re
        .find_iter(raw)
        .map(|m| format!("\"{}\"", m.as_str()))
        .collect();
    parts.join(" AND ")
}

/// Map an FTS5 bm25 rank (lower is better) to a (0, 1] score.
pub fn bm25_rank_to_score(rank: f64) -> f64 {
    if rank.is_nan() || rank.is_infinite() {
        return 0.0;
    }
    1.0 / (1.0 + rank.max(0.0))
}

fn merge_hybrid(
    vector: Vec<VectorHit>,
    keyword: Vec<KeywordHit>,
    vector_weight: f64,
    text_weight: f64,
) -> Vec<SearchResult> {
    struct Merged {
        result: SearchResult,
        vector_score: f64,
        text_score: f64,
    }

    let mut by_id: HashMap<String, Merged> = HashMap::new();
    for hit in vector {
        by_id.insert(
            hit.id,
            Merged {
                result: hit.result,
                vector_score: hit.vector_score,
                text_score: 0.0,
            },
        );
    }
    for hit in keyword {
        match by_id.get_mut(&hit.id) {
            Some(entry) => {
                // Prefer the keyword snippet: it comes from FTS text.
                if !hit.result.snippet.trim().is_empty() {
                    entry.result.snippet = hit.result.snippet;
                }
                entry.text_score = hit.text_score;
            }
            None => {
                by_id.insert(
                    hit.id,
                    Merged {
                        result: hit.result,
                        vector_score: 0.0,
                        text_score: hit.text_score,
                    },
                );
            }
        }
    }

    let mut out: Vec<SearchResult> = by_id
        .into_values()
        .map(|mut m| {
            m.result.score = vector_weight * m.vector_score + text_weight * m.text_score;
            m.result
        })
        .collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}

fn clamp_results(results: Vec<SearchResult>, max_results: usize, min_score: f64) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| r.score >= min_score)
        .take(max_results)
        .collect()
}

fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_string();
    }
    let mut end = max_chars;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vhit(id: &str, score: f64) -> VectorHit {
        VectorHit {
            id: id.into(),
            result: SearchResult {
                path: format!("memory/{id}.md"),
                start_line: 1,
                end_line: 2,
                score,
                snippet: format!("vector snippet {id}"),
            },
            vector_score: score,
        }
    }

    fn khit(id: &str, score: f64) -> KeywordHit {
        KeywordHit {
            id: id.into(),
            result: SearchResult {
                path: format!("memory/{id}.md"),
                start_line: 1,
                end_line: 2,
                score,
                snippet: format!("keyword snippet {id}"),
            },
            text_score: score,
        }
    }

    #[test]
    fn fts_query_quotes_and_joins_tokens() {
        assert_eq!(
            build_fts_query("sqlite vector memory"),
            r#""sqlite" AND "vector" AND "memory""#
        );
        assert_eq!(build_fts_query("a-b c_d"), r#""a" AND "b" AND "c_d""#);
        assert_eq!(build_fts_query("!!!"), "");
    }

    #[test]
    fn bm25_rank_maps_to_unit_interval() {
        assert_eq!(bm25_rank_to_score(0.0), 1.0);
        assert!((bm25_rank_to_score(1.0) - 0.5).abs() < 1e-9);
        assert_eq!(bm25_rank_to_score(f64::NAN), 0.0);
        assert_eq!(bm25_rank_to_score(-5.0), 1.0);
    }

    #[test]
    fn hybrid_scores_combine_per_weights() {
        let merged = merge_hybrid(
            vec![vhit("both", 0.8), vhit("vec-only", 0.6)],
            vec![khit("both", 0.5), khit("kw-only", 0.4)],
            0.7,
            0.3,
        );
        let get = |id: &str| {
            merged
                .iter()
                .find(|r| r.path == format!("memory/{id}.md"))
                .unwrap()
        };
        assert!((get("both").score - (0.7 * 0.8 + 0.3 * 0.5)).abs() < 1e-9);
        assert!((get("vec-only").score - 0.7 * 0.6).abs() < 1e-9);
        assert!((get("kw-only").score - 0.3 * 0.4).abs() < 1e-9);
        // Sorted descending.
        assert!(merged.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn hybrid_prefers_keyword_snippet() {
        let merged = merge_hybrid(vec![vhit("x", 0.9)], vec![khit("x", 0.5)], 0.7, 0.3);
        assert_eq!(merged[0].snippet, "keyword snippet x");
    }

    #[test]
    fn clamp_filters_and_truncates() {
        let results = vec![
            SearchResult {
                path: "a".into(),
                start_line: 1,
                end_line: 1,
                score: 0.9,
                snippet: String::new(),
            },
            SearchResult {
                path: "b".into(),
                start_line: 1,
                end_line: 1,
                score: 0.5,
                snippet: String::new(),
            },
            SearchResult {
                path: "c".into(),
                start_line: 1,
                end_line: 1,
                score: 0.1,
                snippet: String::new(),
            },
        ];
        let out = clamp_results(results, 1, 0.3);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, "a");
    }

    #[test]
    fn memory_path_validation() {
        assert!(is_memory_path("MEMORY.md"));
        assert!(is_memory_path("memory.md"));
        assert!(is_memory_path("memory/2026-02-14.md"));
        assert!(is_memory_path("./memory/x.md"));
        assert!(!is_memory_path("notes/other.md"));
        assert!(!is_memory_path("AGENTS.md"));
        assert!(!is_memory_path("memorybank/x.md"));
    }

    #[test]
    fn clean_path_resolves_traversal() {
        let cleaned = clean_path(Path::new("/ws/memory/../../secret.md"));
        assert_eq!(cleaned, PathBuf::from("/secret.md"));
    }

    #[test]
    fn snippet_truncation_respects_char_boundaries() {
        let s = "é".repeat(400); // 2 bytes each
        let t = truncate_text(&s, 700);
        assert!(t.len() <= 700);
        assert!(t.chars().all(|c| c == 'é'));
    }
}
