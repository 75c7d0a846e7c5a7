// src/config/file.rs
// File-based configuration from ~/.slunk/config.toml. Env vars (see
// `crate::config::env`) take precedence over anything set here; this
// layer exists for settings a user wants to persist across invocations
// without exporting environment variables every time.

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Top-level config structure.
#[derive(Debug, Deserialize, Default)]
pub struct SlunkConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub hash_store: HashStoreConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsFileConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// Database location section.
#[derive(Debug, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file, e.g. `/home/user/.slunk/slunk.db`.
    pub path: Option<String>,
}

/// Hash-store partition directory section.
#[derive(Debug, Deserialize, Default)]
pub struct HashStoreConfig {
    /// Directory holding the monthly-partitioned hash files.
    pub dir: Option<String>,
}

/// Embedding provider section.
#[derive(Debug, Deserialize, Default)]
pub struct EmbeddingsFileConfig {
    /// `"deterministic"` (default) or `"ollama"`.
    pub provider: Option<String>,
    pub ollama_host: Option<String>,
    pub ollama_model: Option<String>,
}

/// Query engine defaults section.
#[derive(Debug, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "QueryConfig::default_limit")]
    pub default_limit: usize,
    #[serde(default = "QueryConfig::default_chunk_window_secs")]
    pub chunk_window_secs: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { default_limit: Self::default_limit(), chunk_window_secs: Self::default_chunk_window_secs() }
    }
}

impl QueryConfig {
    fn default_limit() -> usize {
        50
    }
    fn default_chunk_window_secs() -> i64 {
        crate::query::DEFAULT_CHUNK_WINDOW_SECS
    }
}

impl SlunkConfig {
    /// Load config from `~/.slunk/config.toml`, falling back to defaults
    /// if the file is missing or fails to parse.
    pub fn load() -> Self {
        let path = Self::config_path();

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// The config file path (public so CLI config commands can report it).
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| {
                warn!("HOME directory not set — using current directory for slunk config");
                PathBuf::from(".")
            })
            .join(".slunk")
            .join("config.toml")
    }
}
