// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web tools: web_fetch (readable-content extraction) and web_search
//! (Brave Search API).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use nightjar_core::NightjarError;

use crate::html::{extract_html_text, looks_like_html};
use crate::Registry;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 5;
const MAX_BODY_BYTES: usize = 4 << 20;
const DEFAULT_MAX_CHARS: usize = 50_000;
const MIN_MAX_CHARS: usize = 100;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// web_fetch result blob handed to the model as JSON.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchOutput {
    url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    final_url: String,
    status: u16,
    extractor: &'static str,
    truncated: bool,
    length: usize,
    text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl Registry {
    pub(crate) async fn web_fetch(
        &self,
        raw_url: &str,
        extract_mode: &str,
        max_chars: usize,
    ) -> Result<String, NightjarError> {
        let raw_url = raw_url.trim();
        if raw_url.is_empty() {
            return Err(NightjarError::Tool("url is empty".into()));
        }
        let parsed: reqwest::Url = raw_url
            .parse()
            .map_err(|e| NightjarError::Tool(format!("invalid url: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(NightjarError::Tool(format!("only http/https allowed: {other}")));
            }
        }
        if parsed.host_str().map_or(true, |h| h.trim().is_empty()) {
            return Err(NightjarError::Tool("missing host".into()));
        }

        let extract_mode = match extract_mode.trim() {
            "text" => "text",
            _ => "markdown",
        };
        let max_chars = if max_chars == 0 {
            DEFAULT_MAX_CHARS
        } else {
            max_chars.max(MIN_MAX_CHARS)
        };

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent("nightjar/0.1")
            .build()
            .map_err(|e| NightjarError::provider("failed to build HTTP client", e))?;

        let resp = match client.get(parsed).send().await {
            Ok(resp) => resp,
            Err(e) => {
                // Network failures are data for the model, not failures.
                return json_blob(&FetchOutput {
                    url: raw_url.to_string(),
                    final_url: String::new(),
                    status: 0,
                    extractor: "error",
                    truncated: false,
                    length: 0,
                    text: String::new(),
                    error: e.to_string(),
                });
            }
        };

        let status = resp.status();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut body = resp.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        body.truncate(MAX_BODY_BYTES);
        debug!(url = %final_url, status = status.as_u16(), bytes = body.len(), "web fetch");

        let (extractor, mut text) = if content_type.contains("application/json") {
            match serde_json::from_slice::<serde_json::Value>(&body) {
                Ok(value) => (
                    "json",
                    serde_json::to_string_pretty(&value).unwrap_or_default(),
                ),
                Err(_) => ("raw", String::from_utf8_lossy(&body).into_owned()),
            }
        } else if content_type.contains("text/html") || looks_like_html(&body) {
            let (title, plain) = extract_html_text(&String::from_utf8_lossy(&body));
            let text = if extract_mode == "markdown" && !title.trim().is_empty() {
                format!("# {}\n\n{plain}", title.trim())
            } else {
                plain
            };
            ("html", text)
        } else {
            ("raw", String::from_utf8_lossy(&body).trim().to_string())
        };

        let mut truncated = false;
        if text.len() > max_chars {
            truncated = true;
            let mut end = max_chars;
            while end > 0 && !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }

        json_blob(&FetchOutput {
            url: raw_url.to_string(),
            final_url,
            status: status.as_u16(),
            extractor,
            truncated,
            length: text.len(),
            error: if status.is_success() {
                String::new()
            } else {
                format!("http {}", status.as_u16())
            },
            text,
        })
    }

    pub(crate) async fn web_search(&self, query: &str, count: usize) -> Result<String, NightjarError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(NightjarError::Tool("query is empty".into()));
        }
        let api_key = self.brave_api_key.trim();
        if api_key.is_empty() {
            return Err(NightjarError::Tool("web search requires a Brave API key".into()));
        }
        let count = if count == 0 { 5 } else { count.min(20) };

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| NightjarError::provider("failed to build HTTP client", e))?;
        let resp = client
            .get(self.brave_endpoint())
            .query(&[("q", query), ("count", &count.to_string())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .send()
            .await
            .map_err(|e| NightjarError::Tool(format!("search request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NightjarError::Tool(format!(
                "search http {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: BraveResponse = resp
            .json()
            .await
            .map_err(|e| NightjarError::Tool(format!("parse search response: {e}")))?;
        if parsed.web.results.is_empty() {
            return Ok("No results.".into());
        }

        let mut out = String::new();
        for (i, result) in parsed.web.results.iter().take(count).enumerate() {
            out.push_str(&format!(
                "{}. {}\n   {}\n   {}\n",
                i + 1,
                result.title.trim(),
                result.url.trim(),
                result.description.trim()
            ));
        }
        Ok(out.trim_end().to_string())
    }

    fn brave_endpoint(&self) -> String {
        match &self.brave_base_url {
            Some(url) => url.clone(),
            None => BRAVE_SEARCH_URL.to_string(),
        }
    }
}

fn json_blob<T: Serialize>(value: &T) -> Result<String, NightjarError> {
    serde_json::to_string(value).map_err(|e| NightjarError::Internal(format!("encode output: {e}")))
}

#[cfg(test)]
mod tests {
    use crate::Registry;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let dir = tempfile::tempdir().unwrap();
        let r = Registry::new(dir.path());
        let err = r.web_fetch("ftp://example.com/file", "", 0).await.unwrap_err();
        assert!(err.to_string().contains("only http/https"));
        assert!(r.web_fetch("", "", 0).await.is_err());
    }

    #[tokio::test]
    async fn json_responses_are_pretty_printed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"a": 1, "b": [2, 3]})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let r = Registry::new(dir.path());
        let out = r.web_fetch(&format!("{}/data", server.uri()), "", 0).await.unwrap();
        let blob: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(blob["extractor"], "json");
        assert_eq!(blob["status"], 200);
        assert!(blob["text"].as_str().unwrap().contains("\"a\": 1"));
    }

    #[tokio::test]
    async fn html_is_reduced_to_title_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(
                        "<html><head><title>Docs</title></head><body><p>Read me.</p></body></html>",
                    ),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let r = Registry::new(dir.path());
        let out = r
            .web_fetch(&format!("{}/page", server.uri()), "markdown", 0)
            .await
            .unwrap();
        let blob: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(blob["extractor"], "html");
        let text = blob["text"].as_str().unwrap();
        assert!(text.starts_with("# Docs"));
        assert!(text.contains("Read me."));
    }

    #[tokio::test]
    async fn non_2xx_is_reported_in_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let r = Registry::new(dir.path());
        let out = r.web_fetch(&format!("{}/gone", server.uri()), "", 0).await.unwrap();
        let blob: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(blob["status"], 404);
        assert_eq!(blob["error"], "http 404");
    }

    #[tokio::test]
    async fn long_bodies_are_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("z".repeat(5_000)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let r = Registry::new(dir.path());
        let out = r.web_fetch(&format!("{}/big", server.uri()), "", 200).await.unwrap();
        let blob: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(blob["truncated"], true);
        assert_eq!(blob["length"], 200);
    }

    #[tokio::test]
    async fn search_requires_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let r = Registry::new(dir.path());
        let err = r.web_search("rust", 5).await.unwrap_err();
        assert!(err.to_string().contains("Brave API key"));
    }

    #[tokio::test]
    async fn search_formats_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "web": {"results": [
                    {"title": "Rust", "url": "https://rust-lang.org", "description": "A language."},
                    {"title": "Crates", "url": "https://crates.io", "description": "Packages."}
                ]}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut r = Registry::new(dir.path());
        r.brave_api_key = "bk-test".into();
        let r = r.with_brave_base_url(server.uri());
        let out = r.web_search("rust", 2).await.unwrap();

        assert!(out.contains("1. Rust"));
        assert!(out.contains("https://crates.io"));
    }
}
