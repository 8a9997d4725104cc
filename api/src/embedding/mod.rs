use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::EngineError;

/// Fixed embedding dimensionality for the whole crate.
pub const EMBEDDING_DIM: usize = 1024;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);
const MAX_INPUT_BYTES: usize = 2048;
const COHERE_MODEL: &str = "embed-english-v3.0";

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

/// Collapses whitespace runs, trims the ends, and truncates to the byte cap
/// with an ellipsis marker, per the embedding preprocessing contract.
pub fn preprocess_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= MAX_INPUT_BYTES {
        return collapsed;
    }

    let mut cut = MAX_INPUT_BYTES;
    while !collapsed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &collapsed[..cut])
}

pub struct CohereEmbeddingClient {
    http: reqwest::Client,
    api_key: String,
}

impl CohereEmbeddingClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

fn is_rate_limited(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl EmbeddingClient for CohereEmbeddingClient {
    #[tracing::instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let prepared = preprocess_text(text);
        if prepared.is_empty() {
            return Err(EngineError::ValidationFailure("no input to embed".into()));
        }

        let attempt = AtomicU32::new(0);

        let operation = || async {
            let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;

            let response = self
                .http
                .post("https://api.cohere.com/v1/embed")
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({
                    "model": COHERE_MODEL,
                    "input_type": "search_document",
                    "texts": [prepared],
                }))
                .send()
                .await;

            let (err, rate_limited) = match response {
                Ok(resp) if resp.status().is_success() => {
                    return match resp.json::<EmbedResponse>().await {
                        Ok(parsed) => match parsed.embeddings.into_iter().next() {
                            Some(vector) => Ok(vector),
                            None => Err(backoff::Error::permanent(EngineError::EmbeddingUnavailable)),
                        },
                        Err(err) => Err(backoff::Error::transient(EngineError::TransientNetwork(
                            err.to_string(),
                        ))),
                    };
                }
                Ok(resp) if is_rate_limited(resp.status()) => {
                    (EngineError::TransientNetwork("rate limited".into()), true)
                }
                Ok(resp) => (
                    EngineError::TransientNetwork(format!("provider returned {}", resp.status())),
                    false,
                ),
                Err(err) => (EngineError::TransientNetwork(err.to_string()), false),
            };

            if n >= MAX_ATTEMPTS {
                tracing::warn!(attempt = n, "embedding call failed, giving up");
                return Err(backoff::Error::permanent(EngineError::EmbeddingUnavailable));
            }

            let delay = if rate_limited {
                RETRY_BASE * n
            } else {
                RETRY_BASE
            };
            tracing::warn!(?err, attempt = n, ?delay, "embedding call failed, retrying");
            Err(backoff::Error::retry_after(err, delay))
        };

        let policy = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(RETRY_BASE)
            .with_max_elapsed_time(Some(RETRY_BASE * (MAX_ATTEMPTS + 1)))
            .build();

        let vector = backoff::future::retry(policy, operation)
            .await
            .map_err(|_| EngineError::EmbeddingUnavailable)?;

        if vector.len() != EMBEDDING_DIM {
            return Err(EngineError::EmbeddingShape {
                expected: EMBEDDING_DIM,
                got: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Deterministic in-memory embedding client used by tests (no network access).
#[cfg(test)]
pub struct FixedVectorEmbeddingClient {
    pub vector: Vec<f32>,
}

#[cfg(test)]
#[async_trait]
impl EmbeddingClient for FixedVectorEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::ValidationFailure("no input to embed".into()));
        }
        Ok(self.vector.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_collapses_whitespace() {
        assert_eq!(preprocess_text("  hello   world  \n"), "hello world");
    }

    #[test]
    fn preprocess_truncates_with_ellipsis() {
        let long = "a".repeat(3000);
        let out = preprocess_text(&long);
        assert!(out.ends_with("..."));
        assert!(out.len() <= MAX_INPUT_BYTES + 3);
    }

    #[tokio::test]
    async fn fixed_client_rejects_empty_input() {
        let client = FixedVectorEmbeddingClient {
            vector: vec![0.0; EMBEDDING_DIM],
        };
        let result = client.embed("   ").await;
        assert!(matches!(
            result,
            Err(EngineError::ValidationFailure(_))
        ));
    }

    #[tokio::test]
    async fn fixed_client_returns_configured_vector() {
        let client = FixedVectorEmbeddingClient {
            vector: vec![1.0; EMBEDDING_DIM],
        };
        let result = client.embed("hello").await.unwrap();
        assert_eq!(result.len(), EMBEDDING_DIM);
    }
}
