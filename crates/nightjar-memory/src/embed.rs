// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible embedding provider.
//!
//! Batched `/embeddings` calls with L2-normalized results. The provider
//! fingerprint hashes the provider name, base URL, model, and sorted
//! non-auth headers; rotating credentials to a different endpoint
//! therefore invalidates cache entries keyed by the fingerprint.

use std::collections::HashMap;
use std::time::Duration;

use nightjar_core::NightjarError;
use serde::{Deserialize, Serialize};

use crate::chunker::hash_text;

/// Request timeout for embedding calls.
const EMBED_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct EmbeddingProvider {
    pub provider: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub headers: HashMap<String, String>,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: i64,
    #[serde(default)]
    embedding: Vec<f32>,
}

impl EmbeddingProvider {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        headers: HashMap<String, String>,
    ) -> Result<Self, NightjarError> {
        let http = reqwest::Client::builder()
            .timeout(EMBED_TIMEOUT)
            .build()
            .map_err(|e| NightjarError::provider("failed to build HTTP client", e))?;
        Ok(Self {
            provider: provider.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            headers,
            http,
        })
    }

    /// Embed a batch of texts; one normalized vector per input, in order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, NightjarError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if self.model.trim().is_empty() {
            return Err(NightjarError::provider_msg("memory embedding model is empty"));
        }

        let endpoint = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let mut req = self.http.post(&endpoint).json(&EmbeddingsRequest {
            model: &self.model,
            input: texts,
        });
        if !self.api_key.trim().is_empty() {
            req = req.bearer_auth(self.api_key.trim());
        }
        for (k, v) in &self.headers {
            if k.trim().is_empty() {
                continue;
            }
            req = req.header(k, v);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| NightjarError::provider("embeddings request failed", e))?;
        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(4096);
            return Err(NightjarError::provider_msg(format!(
                "embeddings http {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| NightjarError::provider("parse embeddings response", e))?;
        if parsed.data.is_empty() {
            return Err(NightjarError::provider_msg("embeddings response has no data"));
        }

        let mut out: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for datum in parsed.data {
            let Ok(idx) = usize::try_from(datum.index) else {
                continue;
            };
            if idx >= out.len() {
                continue;
            }
            out[idx] = normalize_embedding(datum.embedding);
        }
        for (i, vec) in out.iter().enumerate() {
            if vec.is_empty() {
                return Err(NightjarError::provider_msg(format!(
                    "embedding index {i} missing in response"
                )));
            }
        }
        Ok(out)
    }

    /// Stable cache-key fingerprint over the provider identity.
    /// Authorization headers are excluded so key rotation alone does not
    /// reset the cache; endpoint or model changes do.
    pub fn provider_key(&self) -> String {
        let mut pairs: Vec<String> = self
            .headers
            .iter()
            .filter(|(k, _)| !k.trim().eq_ignore_ascii_case("authorization"))
            .map(|(k, v)| format!("{}={v}", k.trim()))
            .collect();
        pairs.sort();
        let payload = format!(
            "{}|{}|{}|{}",
            self.provider,
            self.base_url,
            self.model,
            pairs.join("|")
        );
        hash_text(&payload)
    }
}

/// L2-normalize a vector, zeroing NaN/infinite components first.
pub fn normalize_embedding(mut vec: Vec<f32>) -> Vec<f32> {
    if vec.is_empty() {
        return vec;
    }
    let mut norm = 0f64;
    for v in vec.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
        norm += f64::from(*v) * f64::from(*v);
    }
    if norm <= 1e-10 {
        return vec;
    }
    let scale = (1.0 / norm.sqrt()) as f32;
    for v in vec.iter_mut() {
        *v *= scale;
    }
    vec
}

/// Encode a vector as Float32 little-endian bytes for the vec0 table.
pub fn vector_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
