//! Shared HTTP plumbing for the OpenAI-compatible embeddings and chat APIs.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Read `OPENAI_API_KEY`, failing with a message naming the variable.
pub fn api_key_from_env() -> Result<String> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("OPENAI_API_KEY environment variable not set"),
    }
}

/// An authenticated client for one API endpoint.
pub struct ApiClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl ApiClient {
    /// `path` is appended to `base_url` (or the public OpenAI URL).
    pub fn new(
        base_url: Option<&str>,
        path: &str,
        api_key: String,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}{}", base, path),
            api_key,
            max_retries,
        })
    }

    /// POST a JSON body and return the parsed JSON response.
    pub async fn post_json(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), url = %self.url, "retrying");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::warn!(%status, "transient API error");
                        last_err = Some(anyhow::anyhow!("API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("API error {}: {}", status, body_text);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "API request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("request failed after retries")))
    }
}

/// Local HTTP stand-ins for the remote API.
#[cfg(test)]
pub(crate) mod test_support {
    /// Serve `router` on an ephemeral localhost port and return its base URL.
    pub async fn spawn(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Answers `failure` to the first `failures` requests, then 200 with the body echoed.
    async fn flaky_server(failure: StatusCode, failures: usize) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/v1/test",
                post(
                    move |State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>| async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        if n < failures {
                            (failure, Json(json!({"error": "try later"})))
                        } else {
                            (StatusCode::OK, Json(json!({"echo": body})))
                        }
                    },
                ),
            )
            .with_state(Arc::clone(&hits));
        (test_support::spawn(router).await, hits)
    }

    #[tokio::test]
    async fn test_retries_server_error_then_succeeds() {
        let (base, hits) = flaky_server(StatusCode::INTERNAL_SERVER_ERROR, 1).await;
        let client = ApiClient::new(Some(&base), "/v1/test", "key".to_string(), 5, 2).unwrap();

        let out = client.post_json(&json!({"n": 1})).await.unwrap();
        assert_eq!(out["echo"]["n"], 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_fails_without_retry() {
        let (base, hits) = flaky_server(StatusCode::BAD_REQUEST, usize::MAX).await;
        let client = ApiClient::new(Some(&base), "/v1/test", "key".to_string(), 5, 2).unwrap();

        let err = client.post_json(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("400"), "{err}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (base, hits) = flaky_server(StatusCode::TOO_MANY_REQUESTS, usize::MAX).await;
        let client = ApiClient::new(Some(&base), "/v1/test", "key".to_string(), 5, 1).unwrap();

        let err = client.post_json(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("429"), "{err}");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new(
            Some("http://localhost:9/"),
            "/v1/embeddings",
            "key".to_string(),
            5,
            0,
        )
        .unwrap();
        assert_eq!(client.url, "http://localhost:9/v1/embeddings");
    }
}
