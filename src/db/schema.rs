// src/db/schema.rs
// Relational + vector schema (C8) — bit-exact DDL.
//
// `slack_messages` is the store's name for *every* ingested message
// regardless of source app: `workspace`/`channel` are the two-level
// scoping columns every app's parser output maps onto (app name or
// workspace title into `workspace`, conversation/channel/thread name
// into `channel`). The name itself is part of the bit-exact interface
// and is kept even though the store is multi-app.

use rusqlite::Connection;

use super::migration_helpers::create_table_if_missing;

const SLACK_MESSAGES: &str = "
CREATE TABLE IF NOT EXISTS slack_messages (
    id TEXT PRIMARY KEY,
    workspace TEXT NOT NULL,
    channel TEXT NOT NULL,
    sender TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp DATETIME NOT NULL,
    thread_ts TEXT,
    mentions TEXT,
    attachment_names TEXT,
    content_hash TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    edited_at DATETIME,
    ingested_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    date_only DATE GENERATED ALWAYS AS (DATE(timestamp)) STORED,
    month_year TEXT GENERATED ALWAYS AS (strftime('%Y-%m', timestamp)) STORED,
    day_of_week TEXT GENERATED ALWAYS AS (strftime('%w', timestamp)) STORED,
    UNIQUE(workspace, channel, id)
);
";

const SLACK_REACTIONS: &str = "
CREATE TABLE IF NOT EXISTS slack_reactions (
    message_id TEXT NOT NULL,
    emoji TEXT NOT NULL,
    count INTEGER NOT NULL,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(message_id, emoji),
    FOREIGN KEY(message_id) REFERENCES slack_messages(id) ON DELETE CASCADE
);
";

const INGESTION_LOG: &str = "
CREATE TABLE IF NOT EXISTS ingestion_log (
    session_id TEXT NOT NULL,
    workspace TEXT NOT NULL,
    channel TEXT NOT NULL,
    last_message_timestamp TEXT,
    ingested_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    message_count INTEGER NOT NULL DEFAULT 0,
    new_messages INTEGER NOT NULL DEFAULT 0,
    updated_messages INTEGER NOT NULL DEFAULT 0,
    duplicate_messages INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY(session_id, workspace, channel)
);
";

/// Embedding dimension. Fixed per §3's Embedding row invariant.
pub const EMBEDDING_DIM: usize = 512;

fn vec_table_sql() -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS slack_message_embeddings USING vec0(
            embedding float[{EMBEDDING_DIM}],
            message_id TEXT
        );"
    )
}

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_slack_messages_timestamp ON slack_messages(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_slack_messages_workspace_channel ON slack_messages(workspace, channel)",
    "CREATE INDEX IF NOT EXISTS idx_slack_messages_sender ON slack_messages(sender)",
    "CREATE INDEX IF NOT EXISTS idx_slack_messages_date_only ON slack_messages(date_only)",
    "CREATE INDEX IF NOT EXISTS idx_slack_messages_content_hash ON slack_messages(content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_slack_messages_thread_ts ON slack_messages(thread_ts)",
    "CREATE INDEX IF NOT EXISTS idx_slack_reactions_message_id ON slack_reactions(message_id)",
    "CREATE INDEX IF NOT EXISTS idx_slack_reactions_emoji ON slack_reactions(emoji)",
];

/// Run every migration in order. Idempotent: safe to call on every
/// pool open, including against a database created by a prior version
/// of this function.
pub fn run_all_migrations(conn: &Connection) -> anyhow::Result<()> {
    create_table_if_missing(conn, "slack_messages", SLACK_MESSAGES)?;
    create_table_if_missing(conn, "slack_reactions", SLACK_REACTIONS)?;
    create_table_if_missing(conn, "ingestion_log", INGESTION_LOG)?;

    // vec0 virtual tables still register in sqlite_master, so the usual
    // table_exists-gated create_table_if_missing works unchanged.
    create_table_if_missing(conn, "slack_message_embeddings", &vec_table_sql())?;

    for sql in INDEXES {
        conn.execute_batch(sql)?;
    }

    Ok(())
}
