// src/config/env.rs
// Environment-based configuration — single source of truth for all env vars.

use tracing::{debug, info, warn};

/// Which embedding backend to use (§3's embedding provider collaborator).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EmbeddingProviderKind {
    /// Offline, dependency-free default.
    #[default]
    Deterministic,
    /// Local Ollama daemon via its OpenAI-compatible endpoint.
    Ollama,
}

/// Embedding provider configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingsConfig {
    /// `SLUNK_EMBEDDING_PROVIDER`: `deterministic` (default) or `ollama`.
    pub provider: EmbeddingProviderKind,
    /// `SLUNK_OLLAMA_HOST`, e.g. `http://localhost:11434`.
    pub ollama_host: Option<String>,
    /// `SLUNK_OLLAMA_MODEL` override (defaults to `nomic-embed-text`).
    pub ollama_model: Option<String>,
}

impl EmbeddingsConfig {
    pub fn from_env() -> Self {
        let provider = match std::env::var("SLUNK_EMBEDDING_PROVIDER").ok().as_deref() {
            Some(s) if s.eq_ignore_ascii_case("ollama") => EmbeddingProviderKind::Ollama,
            Some(s) if s.eq_ignore_ascii_case("deterministic") => EmbeddingProviderKind::Deterministic,
            Some(other) => {
                warn!(value = other, "unknown SLUNK_EMBEDDING_PROVIDER, using deterministic");
                EmbeddingProviderKind::Deterministic
            }
            None => EmbeddingProviderKind::Deterministic,
        };

        let ollama_host = read_nonempty("SLUNK_OLLAMA_HOST");
        let ollama_model = read_nonempty("SLUNK_OLLAMA_MODEL");

        if provider == EmbeddingProviderKind::Ollama && ollama_host.is_none() {
            debug!("SLUNK_EMBEDDING_PROVIDER=ollama set without SLUNK_OLLAMA_HOST, defaulting to localhost:11434");
        }

        Self { provider, ollama_host, ollama_model }
    }
}

fn read_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Configuration validation result, accumulated by [`EnvConfig::validate`].
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report.
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {err}"));
            }
        }
        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {warn}"));
            }
        }

        if lines.is_empty() { "Configuration OK".to_string() } else { lines.join("\n") }
    }
}

/// Environment configuration — all env vars in one place.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// `SLUNK_DB_PATH` override (defaults to `~/.slunk/slunk.db`).
    pub db_path: Option<String>,
    /// `SLUNK_HASH_STORE_DIR` override (defaults to `~/.slunk/hashstore`).
    pub hash_store_dir: Option<String>,
    /// Embedding provider selection.
    pub embeddings: EmbeddingsConfig,
    /// `SLUNK_QUERY_LIMIT` default row cap for query engine results.
    pub default_query_limit: usize,
    /// `SLUNK_CHUNK_WINDOW_SECS` conversation-chunking gap threshold.
    pub chunk_window_secs: i64,
}

const DEFAULT_QUERY_LIMIT: usize = 50;

impl EnvConfig {
    /// Load all environment configuration (call once at startup).
    pub fn load() -> Self {
        info!("loading environment configuration");

        Self {
            db_path: read_nonempty("SLUNK_DB_PATH"),
            hash_store_dir: read_nonempty("SLUNK_HASH_STORE_DIR"),
            embeddings: EmbeddingsConfig::from_env(),
            default_query_limit: std::env::var("SLUNK_QUERY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_QUERY_LIMIT),
            chunk_window_secs: std::env::var("SLUNK_CHUNK_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::query::DEFAULT_CHUNK_WINDOW_SECS),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if self.embeddings.provider == EmbeddingProviderKind::Ollama && self.embeddings.ollama_host.is_none() {
            validation.add_warning(
                "SLUNK_EMBEDDING_PROVIDER=ollama but SLUNK_OLLAMA_HOST is unset; defaulting to http://localhost:11434",
            );
        }
        if self.default_query_limit == 0 {
            validation.add_error("SLUNK_QUERY_LIMIT must be greater than 0");
        }
        if self.chunk_window_secs <= 0 {
            validation.add_error("SLUNK_CHUNK_WINDOW_SECS must be greater than 0");
        }

        validation
    }
}

pub fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_config_defaults_to_deterministic() {
        let config = EmbeddingsConfig::default();
        assert_eq!(config.provider, EmbeddingProviderKind::Deterministic);
    }

    #[test]
    fn validation_flags_zero_query_limit() {
        let config = EnvConfig {
            db_path: None,
            hash_store_dir: None,
            embeddings: EmbeddingsConfig::default(),
            default_query_limit: 0,
            chunk_window_secs: 600,
        };
        let validation = config.validate();
        assert!(!validation.is_valid());
    }

    #[test]
    fn validation_passes_with_reasonable_defaults() {
        let config = EnvConfig {
            db_path: None,
            hash_store_dir: None,
            embeddings: EmbeddingsConfig::default(),
            default_query_limit: 50,
            chunk_window_secs: 600,
        };
        assert!(config.validate().is_valid());
    }

    #[test]
    fn parse_bool_env_recognizes_common_spellings() {
        assert_eq!(parse_bool_env("SLUNK_TEST_NONEXISTENT_VAR"), None);
    }
}
