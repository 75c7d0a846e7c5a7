// src/cli/mod.rs
// Ambient CLI surface (§6 "EXTERNAL INTERFACES", added): manual ingest/query
// plumbing for testing and ops. Not the spec's RPC/tool endpoint (out of
// scope) — a thin command surface over the same library operations a real
// endpoint would call, grounded on the teacher's `clap`-derived `cli/mod.rs`.

pub mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::accessibility::MockElement;
use crate::config::{EnvConfig, SlunkConfig};
use crate::db::pool::DatabasePool;
use crate::db::search::StructuredFilter;
use crate::deadline::Deadline;
use crate::embeddings::EmbeddingClient;
use crate::hashstore::HashStore;
use crate::ingestion::IngestionPipeline;
use crate::parsers::{AppKind, ParserRegistry};
use crate::query::QueryEngine;

#[derive(Parser)]
#[command(name = "slunk")]
#[command(about = "Desktop conversation harvester: accessibility-tree parsing, dedup ingestion and hybrid search")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the ingest-watch loop (placeholder — the window/process
    /// enumerator that would feed it live accessibility windows is an
    /// out-of-scope collaborator; this just keeps the store open and idle).
    Serve,

    /// Parse a JSON-dumped mock accessibility window through one app's
    /// parser and ingest every conversation it yields.
    Ingest {
        /// Which application grammar to parse the window with.
        #[arg(long, value_name = "APP")]
        app: String,
        /// Path to a JSON-dumped `MockElement` window.
        window: PathBuf,
        /// Workspace/account name to scope ingested rows under.
        #[arg(long, default_value = "default")]
        workspace: String,
    },

    /// Query the store.
    Query {
        #[command(subcommand)]
        action: QueryAction,
    },

    /// Evict hash-dedup partitions older than the retention window.
    HashStoreGc,
}

#[derive(Subcommand)]
pub enum QueryAction {
    /// Plain keyword search.
    Keyword {
        text: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Structured filter search.
    Structured {
        #[arg(long)]
        workspace: Option<String>,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Vector k-NN search.
    Semantic {
        text: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
    /// Hybrid (semantic + keyword) search.
    Hybrid {
        text: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Resolve the database path: `SLUNK_DB_PATH`, else the file config's
/// `[database].path`, else `~/.slunk/slunk.db`.
fn resolve_db_path(env: &EnvConfig, file: &SlunkConfig) -> PathBuf {
    if let Some(path) = &env.db_path {
        return PathBuf::from(path);
    }
    if let Some(path) = &file.database.path {
        return PathBuf::from(path);
    }
    default_state_dir().join("slunk.db")
}

/// Resolve the hash-dedup store directory the same way.
fn resolve_hash_store_dir(env: &EnvConfig, file: &SlunkConfig) -> PathBuf {
    if let Some(dir) = &env.hash_store_dir {
        return PathBuf::from(dir);
    }
    if let Some(dir) = &file.hash_store.dir {
        return PathBuf::from(dir);
    }
    default_state_dir().join("hashstore")
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".slunk")
}

fn build_embeddings(env: &EnvConfig) -> Arc<EmbeddingClient> {
    let provider_name = match env.embeddings.provider {
        crate::config::EmbeddingProviderKind::Deterministic => "deterministic",
        crate::config::EmbeddingProviderKind::Ollama => "ollama",
    };
    Arc::new(EmbeddingClient::from_provider_name(
        provider_name,
        env.embeddings.ollama_host.clone(),
        env.embeddings.ollama_model.clone(),
    ))
}

/// Dispatch a parsed [`Cli`] to its handler. The single entry point
/// `main.rs` calls after loading configuration and initializing logging.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let env = EnvConfig::load();
    let validation = env.validate();
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }
    if !validation.is_valid() {
        anyhow::bail!("invalid configuration:\n{}", validation.report());
    }
    let file_config = SlunkConfig::load();
    let db_path = resolve_db_path(&env, &file_config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve(&db_path).await,
        Commands::Ingest { app, window, workspace } => {
            run_ingest(&env, &file_config, &db_path, &app, &window, &workspace).await
        }
        Commands::Query { action } => run_query(&env, &db_path, action).await,
        Commands::HashStoreGc => run_hash_store_gc(&env, &file_config),
    }
}

async fn run_serve(db_path: &std::path::Path) -> anyhow::Result<()> {
    serve::run(db_path).await
}

async fn run_ingest(
    env: &EnvConfig,
    file_config: &SlunkConfig,
    db_path: &std::path::Path,
    app: &str,
    window_path: &std::path::Path,
    workspace: &str,
) -> anyhow::Result<()> {
    let app_kind: AppKind = app
        .parse()
        .map_err(|_| anyhow::anyhow!("unrecognized app '{app}' — see AppKind for the supported list"))?;

    let raw = std::fs::read_to_string(window_path)?;
    let window = MockElement::from_json_str(&raw)?;

    let registry = ParserRegistry::new();
    let parsed = registry.parse(app_kind, &window, Deadline::never()).await?;
    for warning in &parsed.warnings {
        tracing::warn!(app = %app_kind, "{warning}");
    }

    let pool = Arc::new(DatabasePool::open(db_path).await?);
    let embeddings = build_embeddings(env);
    let hash_store = HashStore::open(resolve_hash_store_dir(env, file_config))?;
    let pipeline =
        IngestionPipeline::new(pool, embeddings).with_hash_store(Arc::new(tokio::sync::Mutex::new(hash_store)));

    let session_id = uuid::Uuid::new_v4().to_string();
    let mut total = crate::ingestion::IngestResult::default();
    for conversation in &parsed.conversations {
        let result = pipeline.ingest_conversation(&session_id, workspace, conversation).await?;
        info!(
            channel = %conversation.channel_name,
            new = result.new_messages,
            updated = result.updated_messages,
            duplicate = result.duplicate_messages,
            reactions_updated = result.reactions_updated_messages,
            "ingested conversation"
        );
        total.new_messages += result.new_messages;
        total.updated_messages += result.updated_messages;
        total.duplicate_messages += result.duplicate_messages;
        total.reactions_updated_messages += result.reactions_updated_messages;
    }
    println!(
        "conversations={} new={} updated={} duplicate={} reactions_updated={}",
        parsed.conversations.len(),
        total.new_messages,
        total.updated_messages,
        total.duplicate_messages,
        total.reactions_updated_messages
    );
    Ok(())
}

async fn run_query(env: &EnvConfig, db_path: &std::path::Path, action: QueryAction) -> anyhow::Result<()> {
    let pool = Arc::new(DatabasePool::open(db_path).await?);
    let embeddings = build_embeddings(env);
    let engine = QueryEngine::new(pool, embeddings);
    let default_limit = env.default_query_limit;

    match action {
        QueryAction::Keyword { text, limit } => {
            let hits = engine.keyword_search(&text, limit.unwrap_or(default_limit)).await?;
            for hit in hits {
                println!("{} [{}/{}] {}: {}", hit.timestamp, hit.workspace, hit.channel, hit.sender, hit.content);
            }
        }
        QueryAction::Structured { workspace, channel, sender, keyword, limit } => {
            let filter = StructuredFilter {
                workspace,
                channel,
                senders: sender.into_iter().collect(),
                keyword,
                ..Default::default()
            };
            let hits = engine.structured_search(filter, limit.unwrap_or(default_limit)).await?;
            for hit in hits {
                println!("{} [{}/{}] {}: {}", hit.timestamp, hit.workspace, hit.channel, hit.sender, hit.content);
            }
        }
        QueryAction::Semantic { text, k } => {
            let hits = engine.semantic_search(&text, k).await?;
            for hit in hits {
                println!("{:.4} {} {}: {}", hit.distance, hit.message.timestamp, hit.message.sender, hit.message.content);
            }
        }
        QueryAction::Hybrid { text, limit } => {
            let hits = engine.hybrid_search(&text, StructuredFilter::default(), limit.unwrap_or(default_limit)).await?;
            for hit in hits {
                let tag = match &hit {
                    crate::query::HybridHit::Semantic { .. } => "semantic",
                    crate::query::HybridHit::Keyword { .. } => "keyword",
                };
                let message = hit.message();
                println!("[{tag}] {} {}: {}", message.timestamp, message.sender, message.content);
            }
        }
    }
    Ok(())
}

fn run_hash_store_gc(env: &EnvConfig, file_config: &SlunkConfig) -> anyhow::Result<()> {
    let dir = resolve_hash_store_dir(env, file_config);
    let mut store = HashStore::open(&dir)?;
    store.evict_expired(chrono::Local::now())?;
    println!("hash-store at {} now holds {} entries", dir.display(), store.total_count());
    Ok(())
}
