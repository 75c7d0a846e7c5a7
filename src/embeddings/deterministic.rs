// src/embeddings/deterministic.rs
// A local, dependency-free embedding provider: deterministic given the
// same text, usable offline and in tests without an Ollama daemon
// running. Not semantically meaningful beyond rewarding shared
// character trigrams — it exists so ingestion always has a provider to
// fall back to per §3 ("never guesses, but never blocks on a missing
// external service either").

use sha2::{Digest, Sha256};

use crate::db::schema::EMBEDDING_DIM;
use crate::error::HarvesterError;

pub const MODEL_NAME: &str = "deterministic-trigram-hash-v1";

/// Hashes each character trigram of `text` into one of [`EMBEDDING_DIM`]
/// buckets and L2-normalizes the resulting histogram. Two texts sharing
/// more trigrams land closer together under cosine distance; this is a
/// crude signal, not a trained embedding, but it is fully deterministic
/// and needs no network access.
pub fn embed(text: &str) -> Vec<f32> {
    let mut buckets = vec![0f32; EMBEDDING_DIM];
    let chars: Vec<char> = text.chars().collect();

    if chars.is_empty() {
        buckets[0] = 1.0;
        return buckets;
    }

    if chars.len() < 3 {
        let bucket = bucket_for(&chars.iter().collect::<String>());
        buckets[bucket] += 1.0;
    } else {
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let bucket = bucket_for(&trigram);
            buckets[bucket] += 1.0;
        }
    }

    normalize(&mut buckets);
    buckets
}

pub fn embed_batch(texts: &[String]) -> Vec<Vec<f32>> {
    texts.iter().map(|t| embed(t)).collect()
}

fn bucket_for(s: &str) -> usize {
    let digest = Sha256::digest(s.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (prefix as usize) % EMBEDDING_DIM
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Embeds `text` and rejects on dimension mismatch — always succeeds in
/// practice since `embed` always returns [`EMBEDDING_DIM`] components,
/// but keeps the same fallible shape as [`crate::embeddings::EmbeddingProvider`].
pub fn embed_checked(text: &str) -> Result<Vec<f32>, HarvesterError> {
    let v = embed(text);
    if v.len() != EMBEDDING_DIM {
        return Err(HarvesterError::InvalidVectorDimensions { expected: EMBEDDING_DIM, actual: v.len() });
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_embeds_identically() {
        assert_eq!(embed("hello world"), embed("hello world"));
    }

    #[test]
    fn different_text_embeds_differently() {
        assert_ne!(embed("hello world"), embed("goodbye world"));
    }

    #[test]
    fn always_produces_fixed_dimension() {
        assert_eq!(embed("").len(), EMBEDDING_DIM);
        assert_eq!(embed("x").len(), EMBEDDING_DIM);
        assert_eq!(embed("a reasonably long sentence of english text").len(), EMBEDDING_DIM);
    }

    #[test]
    fn output_is_unit_normalized() {
        let v = embed("some shared content");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn shared_trigrams_are_closer_than_unrelated_text() {
        let a = embed("the quick brown fox");
        let b = embed("the quick brown dog");
        let c = embed("zzz totally unrelated zzz");

        let dot = |x: &[f32], y: &[f32]| x.iter().zip(y).map(|(p, q)| p * q).sum::<f32>();
        assert!(dot(&a, &b) > dot(&a, &c));
    }
}
