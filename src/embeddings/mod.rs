// src/embeddings/mod.rs
// Embedding provider selection — the text→vector collaborator that
// ingestion (C9) calls to populate `slack_message_embeddings`, and the
// query engine (C10) calls to embed a search query for k-NN.
//
// The relational+vector schema (C8) fixes every stored vector at
// `EMBEDDING_DIM` components; a provider's native output is resized
// (truncated or zero-padded) to that width at the boundary here, so
// swapping providers never requires a schema migration.

mod deterministic;
mod ollama;

pub use ollama::OllamaEmbeddings;

use crate::db::schema::EMBEDDING_DIM;
use crate::error::HarvesterError;

/// Resizes `v` to exactly [`EMBEDDING_DIM`] components: truncates if
/// longer, zero-pads if shorter. A provider whose native dimensionality
/// doesn't match ours (e.g. Ollama's `nomic-embed-text` at 768) still
/// produces a usable, if lossy, vector rather than failing ingestion.
fn resize_to_embedding_dim(mut v: Vec<f32>) -> Vec<f32> {
    match v.len().cmp(&EMBEDDING_DIM) {
        std::cmp::Ordering::Greater => v.truncate(EMBEDDING_DIM),
        std::cmp::Ordering::Less => v.resize(EMBEDDING_DIM, 0.0),
        std::cmp::Ordering::Equal => {}
    }
    v
}

enum Backend {
    Deterministic,
    Ollama(OllamaEmbeddings),
}

/// The embedding provider ingestion and query use, wrapping whichever
/// concrete backend configuration selected.
pub struct EmbeddingClient {
    backend: Backend,
}

impl EmbeddingClient {
    /// The offline, dependency-free default: deterministic given the
    /// same input, no network access.
    pub fn deterministic() -> Self {
        Self { backend: Backend::Deterministic }
    }

    /// An Ollama-backed provider against `base_url` (e.g.
    /// `http://localhost:11434`).
    pub fn ollama(base_url: String, model: Option<String>, dimensions: Option<usize>) -> Self {
        Self { backend: Backend::Ollama(OllamaEmbeddings::new(base_url, model, dimensions)) }
    }

    /// Selects a backend by name (`"deterministic"` or `"ollama"`), the
    /// shape [`crate::config`] hands this after reading its provider
    /// setting. Falls back to `deterministic` for an unrecognized name
    /// rather than failing startup over a typo in a config file.
    pub fn from_provider_name(name: &str, ollama_host: Option<String>, ollama_model: Option<String>) -> Self {
        match name {
            "ollama" => {
                let host = ollama_host.unwrap_or_else(|| "http://localhost:11434".to_string());
                Self::ollama(host, ollama_model, None)
            }
            _ => Self::deterministic(),
        }
    }

    pub fn model_name(&self) -> &str {
        match &self.backend {
            Backend::Deterministic => deterministic::MODEL_NAME,
            Backend::Ollama(c) => c.model_name(),
        }
    }

    /// Embed one piece of text, resized to [`EMBEDDING_DIM`].
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, HarvesterError> {
        let v = match &self.backend {
            Backend::Deterministic => deterministic::embed_checked(text)?,
            Backend::Ollama(c) => c.embed(text).await?,
        };
        Ok(resize_to_embedding_dim(v))
    }

    /// Embed a batch of texts, each resized to [`EMBEDDING_DIM`].
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, HarvesterError> {
        let vs = match &self.backend {
            Backend::Deterministic => deterministic::embed_batch(texts),
            Backend::Ollama(c) => c.embed_batch(texts).await?,
        };
        Ok(vs.into_iter().map(resize_to_embedding_dim).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_embed_is_fixed_dimension() {
        let client = EmbeddingClient::deterministic();
        let v = client.embed("hello").await.unwrap();
        assert_eq!(v.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn deterministic_embed_batch_matches_singleton_embed() {
        let client = EmbeddingClient::deterministic();
        let batch = client.embed_batch(&["hello".to_string()]).await.unwrap();
        let single = client.embed("hello").await.unwrap();
        assert_eq!(batch[0], single);
    }

    #[test]
    fn resize_truncates_longer_vectors() {
        let v = vec![1.0f32; EMBEDDING_DIM + 10];
        assert_eq!(resize_to_embedding_dim(v).len(), EMBEDDING_DIM);
    }

    #[test]
    fn resize_zero_pads_shorter_vectors() {
        let v = vec![1.0f32; EMBEDDING_DIM - 10];
        let resized = resize_to_embedding_dim(v);
        assert_eq!(resized.len(), EMBEDDING_DIM);
        assert_eq!(resized[EMBEDDING_DIM - 1], 0.0);
    }

    #[test]
    fn from_provider_name_falls_back_to_deterministic_for_unknown() {
        let client = EmbeddingClient::from_provider_name("not-a-real-provider", None, None);
        assert_eq!(client.model_name(), deterministic::MODEL_NAME);
    }
}
