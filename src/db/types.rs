// src/db/types.rs
// Row types returned by the database layer (C8) — the persisted shape of
// the records C9 writes and C10 reads back out.

use chrono::{DateTime, Local, TimeZone};
use rusqlite::Row;

use crate::error::HarvesterError;

/// One row of `slack_messages`, with its generated columns and JSON-encoded
/// list fields decoded back into their Rust shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub workspace: String,
    pub channel: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
    pub thread_ts: Option<String>,
    pub mentions: Vec<String>,
    pub attachment_names: Vec<String>,
    pub content_hash: String,
    pub version: i64,
    pub edited_at: Option<DateTime<Local>>,
    pub ingested_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    pub date_only: String,
    pub month_year: String,
    pub day_of_week: String,
}

/// One row of `slack_reactions`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReaction {
    pub message_id: String,
    pub emoji: String,
    pub count: u32,
    pub updated_at: DateTime<Local>,
}

/// One row of `ingestion_log` — the running totals for one
/// (session, workspace, channel) ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionLogRow {
    pub session_id: String,
    pub workspace: String,
    pub channel: String,
    pub last_message_timestamp: Option<String>,
    pub message_count: u32,
    pub new_messages: u32,
    pub updated_messages: u32,
    pub duplicate_messages: u32,
}

/// Parses a SQLite `DATETIME` column (`YYYY-MM-DD HH:MM:SS[.fff]`, the
/// format `CURRENT_TIMESTAMP` and our own inserts use) into a local
/// [`DateTime`].
pub fn parse_sqlite_datetime(raw: &str) -> Result<DateTime<Local>, HarvesterError> {
    let naive = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| HarvesterError::Malformed(format!("unparseable datetime '{raw}': {e}")))?;
    match Local.from_local_datetime(&naive).single() {
        Some(dt) => Ok(dt),
        None => Err(HarvesterError::Malformed(format!("ambiguous local datetime '{raw}'"))),
    }
}

fn parse_json_string_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok()).unwrap_or_default()
}

impl StoredMessage {
    /// Decode one row of `SELECT * FROM slack_messages` (column order must
    /// match the table's declared order in `schema.rs`).
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let timestamp_raw: String = row.get("timestamp")?;
        let ingested_at_raw: String = row.get("ingested_at")?;
        let updated_at_raw: String = row.get("updated_at")?;
        let edited_at_raw: Option<String> = row.get("edited_at")?;
        let mentions_raw: Option<String> = row.get("mentions")?;
        let attachments_raw: Option<String> = row.get("attachment_names")?;

        Ok(StoredMessage {
            id: row.get("id")?,
            workspace: row.get("workspace")?,
            channel: row.get("channel")?,
            sender: row.get("sender")?,
            content: row.get("content")?,
            timestamp: parse_sqlite_datetime(&timestamp_raw).unwrap_or_else(|_| Local::now()),
            thread_ts: row.get("thread_ts")?,
            mentions: parse_json_string_list(mentions_raw),
            attachment_names: parse_json_string_list(attachments_raw),
            content_hash: row.get("content_hash")?,
            version: row.get("version")?,
            edited_at: edited_at_raw.and_then(|s| parse_sqlite_datetime(&s).ok()),
            ingested_at: parse_sqlite_datetime(&ingested_at_raw).unwrap_or_else(|_| Local::now()),
            updated_at: parse_sqlite_datetime(&updated_at_raw).unwrap_or_else(|_| Local::now()),
            date_only: row.get("date_only")?,
            month_year: row.get("month_year")?,
            day_of_week: row.get("day_of_week")?,
        })
    }
}

impl StoredReaction {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let updated_at_raw: String = row.get("updated_at")?;
        Ok(StoredReaction {
            message_id: row.get("message_id")?,
            emoji: row.get("emoji")?,
            count: row.get::<_, i64>("count")? as u32,
            updated_at: parse_sqlite_datetime(&updated_at_raw).unwrap_or_else(|_| Local::now()),
        })
    }
}
