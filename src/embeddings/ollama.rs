// src/embeddings/ollama.rs
// Ollama embeddings via its OpenAI-compatible /v1/embeddings endpoint —
// the one real HTTP-backed provider (§3's embedding model is "an
// external, deterministic text→vector collaborator").

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::HarvesterError;

const DEFAULT_MODEL: &str = "nomic-embed-text";
const DEFAULT_DIMENSIONS: usize = 768;
const MAX_TEXT_CHARS: usize = 8192 * 4;
const MAX_BATCH_SIZE: usize = 64;
const RETRY_ATTEMPTS: usize = 1;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[allow(dead_code)]
    index: usize,
}

/// Truncates `text` to at most `max_chars`, backing off to the nearest
/// preceding UTF-8 character boundary so the cut never lands mid-codepoint.
fn truncate_at_boundary(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut boundary = max_chars;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    &text[..boundary]
}

/// Ollama embeddings client (OpenAI-compatible endpoint, no auth required).
pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    dimensions: usize,
    http_client: reqwest::Client,
}

impl OllamaEmbeddings {
    pub fn new(base_url: String, model: Option<String>, dimensions: Option<usize>) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let dimensions = dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        let base_url = base_url.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { base_url, model, dimensions, http_client }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, HarvesterError> {
        let results = self.embed_texts(&[text.to_string()]).await?;
        results.into_iter().next().ok_or_else(|| {
            HarvesterError::EmbeddingUnavailable("empty embedding response from Ollama".into())
        })
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, HarvesterError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.len() <= MAX_BATCH_SIZE {
            return self.embed_texts(texts).await;
        }
        let mut all_results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            all_results.extend(self.embed_texts(chunk).await?);
        }
        Ok(all_results)
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, HarvesterError> {
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| {
                if t.len() > MAX_TEXT_CHARS {
                    debug!(from = t.len(), to = MAX_TEXT_CHARS, "truncating text for Ollama embedding");
                    truncate_at_boundary(t, MAX_TEXT_CHARS)
                } else {
                    t.as_str()
                }
            })
            .collect();

        let input_value = if inputs.len() == 1 {
            serde_json::Value::String(inputs[0].to_string())
        } else {
            serde_json::Value::Array(inputs.iter().map(|s| serde_json::Value::String(s.to_string())).collect())
        };

        let body = serde_json::json!({
            "input": input_value,
            "model": self.model,
        });

        let url = format!("{}/v1/embeddings", self.base_url);

        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(1000)).await;
            }

            match self.http_client.post(&url).header("Content-Type", "application/json").json(&body).send().await
            {
                Ok(response) => {
                    if response.status().is_success() {
                        let resp: EmbeddingResponse = response.json().await.map_err(|e| {
                            HarvesterError::EmbeddingUnavailable(format!(
                                "failed to parse Ollama embedding response: {e}"
                            ))
                        })?;

                        let mut data = resp.data;
                        data.sort_by_key(|d| d.index);
                        return Ok(data.into_iter().map(|d| d.embedding).collect());
                    }

                    let status = response.status();
                    let body_text = response.text().await.unwrap_or_default();
                    last_error = Some(HarvesterError::EmbeddingUnavailable(format!(
                        "Ollama embedding request failed ({status}): {body_text}"
                    )));
                }
                Err(e) => {
                    last_error =
                        Some(HarvesterError::EmbeddingUnavailable(format!("Ollama embedding request error: {e}")));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| HarvesterError::EmbeddingUnavailable("Ollama embedding failed".into())))
    }
}
