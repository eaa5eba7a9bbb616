// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end index tests against a temp workspace and a mock
//! `/embeddings` endpoint.

use std::path::Path;

use nightjar_config::model::Config;
use nightjar_memory::{IndexManager, ReadOptions, SearchManager, SearchOptions};
use sha2::{Digest, Sha256};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Deterministic pseudo-embedding: 8 dims derived from the text hash,
/// L2-normalized so cosine distances are meaningful.
fn fake_embedding(text: &str) -> Vec<f64> {
    let digest = Sha256::digest(text.as_bytes());
    let mut out: Vec<f64> = digest[..8]
        .iter()
        .map(|b| (f64::from(*b) / 127.5) - 1.0)
        .collect();
    let norm: f64 = out.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 1e-10 {
        for v in &mut out {
            *v /= norm;
        }
    }
    out
}

async fn embedding_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(|req: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let texts: Vec<String> = match &body["input"] {
                serde_json::Value::String(s) => vec![s.clone()],
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .collect(),
                _ => vec![],
            };
            let data: Vec<serde_json::Value> = texts
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    serde_json::json!({"index": i, "embedding": fake_embedding(text)})
                })
                .collect();
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": data }))
        })
        .mount(&server)
        .await;
    server
}

fn test_config(server_uri: &str, workspace: &Path) -> Config {
    let mut cfg = Config::default();
    let search = &mut cfg.agents.defaults.memory_search;
    search.enabled = Some(true);
    search.provider = "openai".into();
    search.model = "text-embedding-3-small".into();
    search.remote.base_url = format!("{server_uri}/v1");
    search.remote.api_key = "test-key".into();
    search.store.path = workspace
        .join(".memory")
        .join("index.sqlite")
        .to_string_lossy()
        .into_owned();
    cfg
}

fn seed_workspace(ws: &Path) {
    std::fs::create_dir_all(ws.join("memory")).unwrap();
    std::fs::write(
        ws.join("MEMORY.md"),
        "# Long-term Memory\n\n- project codename is Nebula\n",
    )
    .unwrap();
    std::fs::write(
        ws.join("memory").join("2026-02-14.md"),
        "We decided to use sqlite vector search for memory recall.\n",
    )
    .unwrap();
}

#[tokio::test]
async fn disabled_config_yields_no_manager() {
    let ws = tempfile::tempdir().unwrap();
    let cfg = Config::default();
    let mgr = IndexManager::open(&cfg, ws.path()).await.unwrap();
    assert!(mgr.is_none());
}

#[tokio::test]
async fn search_finds_daily_note_and_read_file_validates_paths() {
    let ws = tempfile::tempdir().unwrap();
    seed_workspace(ws.path());
    let server = embedding_server().await;
    let cfg = test_config(&server.uri(), ws.path());

    let mgr = IndexManager::open(&cfg, ws.path()).await.unwrap().unwrap();

    let results = mgr
        .search(
            "sqlite vector memory",
            SearchOptions {
                max_results: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!results.is_empty(), "expected search results");
    assert!(
        results.iter().any(|r| r.path == "memory/2026-02-14.md"),
        "expected daily memory file in results, got: {results:?}"
    );

    let (text, resolved) = mgr
        .read_file("memory/2026-02-14.md", ReadOptions { from: 1, lines: 1 })
        .await
        .unwrap();
    assert_eq!(resolved, "memory/2026-02-14.md");
    assert!(text.contains("sqlite vector search"));

    let err = mgr.read_file("../secret.md", ReadOptions::default()).await;
    assert!(err.is_err(), "expected path validation error");
    let err = mgr.read_file("AGENTS.md", ReadOptions::default()).await;
    assert!(err.is_err(), "non-memory paths must be rejected");
}

#[tokio::test]
async fn second_sync_is_idempotent_and_embeds_nothing() {
    let ws = tempfile::tempdir().unwrap();
    seed_workspace(ws.path());
    let server = embedding_server().await;
    let cfg = test_config(&server.uri(), ws.path());

    let mgr = IndexManager::open(&cfg, ws.path()).await.unwrap().unwrap();

    mgr.sync(false).await.unwrap();
    let calls_after_first = server.received_requests().await.unwrap().len();
    assert!(calls_after_first > 0, "first sync should embed chunks");

    mgr.sync(false).await.unwrap();
    let calls_after_second = server.received_requests().await.unwrap().len();
    assert_eq!(
        calls_after_first, calls_after_second,
        "unchanged files must not be re-embedded"
    );

    let status = mgr.status().await;
    assert_eq!(status.files, 2);
    assert!(status.chunks >= 2);
    assert!(status.vector_ready);
    assert_eq!(status.vector_dims, 8);
    assert!(status.fts_ready);
}

#[tokio::test]
async fn changed_file_is_reindexed_and_deleted_file_is_dropped() {
    let ws = tempfile::tempdir().unwrap();
    seed_workspace(ws.path());
    let server = embedding_server().await;
    let cfg = test_config(&server.uri(), ws.path());

    let mgr = IndexManager::open(&cfg, ws.path()).await.unwrap().unwrap();
    mgr.sync(false).await.unwrap();
    assert_eq!(mgr.status().await.files, 2);

    // Change one file, remove the other.
    std::fs::write(
        ws.path().join("MEMORY.md"),
        "# Long-term Memory\n\n- codename changed to Meridian\n",
    )
    .unwrap();
    std::fs::remove_file(ws.path().join("memory").join("2026-02-14.md")).unwrap();
    mgr.sync(false).await.unwrap();

    let status = mgr.status().await;
    assert_eq!(status.files, 1);

    let results = mgr
        .search(
            "codename Meridian",
            SearchOptions {
                max_results: 5,
                min_score: 0.01,
            },
        )
        .await
        .unwrap();
    assert!(results.iter().any(|r| r.path == "MEMORY.md"));
    assert!(results.iter().all(|r| r.path != "memory/2026-02-14.md"));
}

#[tokio::test]
async fn cache_survives_a_full_reset() {
    let ws = tempfile::tempdir().unwrap();
    seed_workspace(ws.path());
    let server = embedding_server().await;
    let cfg = test_config(&server.uri(), ws.path());

    let mgr = IndexManager::open(&cfg, ws.path()).await.unwrap().unwrap();
    mgr.sync(false).await.unwrap();
    let baseline = server.received_requests().await.unwrap().len();

    // A forced rebuild re-chunks everything, but every chunk hash is
    // already in the embedding cache.
    mgr.sync(true).await.unwrap();
    let after_force = server.received_requests().await.unwrap().len();
    assert_eq!(baseline, after_force, "forced rebuild should be served from cache");
}
