// src/db/messages.rs
// Relational writes/reads for `slack_messages` and `slack_reactions` (C8),
// the synchronous half of the ingestion pipeline (C9) — every function
// here runs inside `DatabasePool::run`/`run_with_retry` on the pool's
// blocking thread.

use chrono::{DateTime, Local};
use rusqlite::{Connection, OptionalExtension, params};

use crate::db::types::{IngestionLogRow, StoredMessage, StoredReaction, parse_sqlite_datetime};
use crate::error::HarvesterError;
use crate::parsers::Reaction;

/// Content-level identity lookup (§4.7 step 1): the most recently stored
/// row sharing `(workspace, channel, sender, content)`, ignoring
/// timestamp jitter between re-renders of the same message.
pub fn find_by_content_identity_sync(
    conn: &Connection,
    workspace: &str,
    channel: &str,
    sender: &str,
    canonical_content: &str,
) -> Result<Option<StoredMessage>, HarvesterError> {
    conn.query_row(
        "SELECT * FROM slack_messages
         WHERE workspace = ?1 AND channel = ?2 AND sender = ?3 AND content = ?4
         ORDER BY timestamp DESC LIMIT 1",
        params![workspace, channel, sender, canonical_content],
        StoredMessage::from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Logical-identity lookup (§4.7 step 2): the row for this exact
/// `(workspace, channel, id)`, used to detect edits (same id, new hash).
pub fn find_by_logical_id_sync(
    conn: &Connection,
    workspace: &str,
    channel: &str,
    id: &str,
) -> Result<Option<StoredMessage>, HarvesterError> {
    conn.query_row(
        "SELECT * FROM slack_messages WHERE workspace = ?1 AND channel = ?2 AND id = ?3",
        params![workspace, channel, id],
        StoredMessage::from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// All reactions currently stored for `message_id`.
pub fn reactions_for_message_sync(
    conn: &Connection,
    message_id: &str,
) -> Result<Vec<StoredReaction>, HarvesterError> {
    let mut stmt =
        conn.prepare("SELECT * FROM slack_reactions WHERE message_id = ?1 ORDER BY emoji")?;
    let rows = stmt.query_map(params![message_id], StoredReaction::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub workspace: &'a str,
    pub channel: &'a str,
    pub sender: &'a str,
    pub content: &'a str,
    pub timestamp: DateTime<Local>,
    pub thread_ts: Option<&'a str>,
    pub mentions: &'a [String],
    pub attachment_names: &'a [String],
    pub content_hash: &'a str,
}

/// Insert a brand-new row with `version = 1` (§4.9 step "for NEW, insert
/// row").
pub fn insert_new_message_sync(conn: &Connection, msg: &NewMessage<'_>) -> Result<(), HarvesterError> {
    let mentions_json = serde_json::to_string(msg.mentions)?;
    let attachments_json = serde_json::to_string(msg.attachment_names)?;
    conn.execute(
        "INSERT INTO slack_messages
            (id, workspace, channel, sender, content, timestamp, thread_ts,
             mentions, attachment_names, content_hash, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)",
        params![
            msg.id,
            msg.workspace,
            msg.channel,
            msg.sender,
            msg.content,
            msg.timestamp.to_rfc3339(),
            msg.thread_ts,
            mentions_json,
            attachments_json,
            msg.content_hash,
        ],
    )?;
    Ok(())
}

/// Apply an edit to an existing row: new content/hash, `version += 1`,
/// `edited_at`/`updated_at` bumped to now (§4.7's UPDATED case).
pub fn update_message_content_sync(
    conn: &Connection,
    workspace: &str,
    channel: &str,
    id: &str,
    content: &str,
    content_hash: &str,
) -> Result<(), HarvesterError> {
    let updated = conn.execute(
        "UPDATE slack_messages
         SET content = ?1, content_hash = ?2, version = version + 1,
             edited_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
         WHERE workspace = ?3 AND channel = ?4 AND id = ?5",
        params![content, content_hash, workspace, channel, id],
    )?;
    if updated == 0 {
        return Err(HarvesterError::Malformed(format!(
            "update_message_content: no row for ({workspace}, {channel}, {id})"
        )));
    }
    Ok(())
}

/// Bump `updated_at` without touching `version` or `content` — used for
/// the REACTIONS_UPDATED path, where the message body itself hasn't
/// changed.
pub fn touch_message_sync(conn: &Connection, id: &str) -> Result<(), HarvesterError> {
    conn.execute(
        "UPDATE slack_messages SET updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Replace `message_id`'s reaction set: delete then insert (§4.9's
/// "clear then insert", atomic within the caller's transaction/run).
/// Idempotent per `(message_id, emoji)` per §3's invariant.
pub fn replace_reactions_sync(
    conn: &Connection,
    message_id: &str,
    reactions: &[Reaction],
) -> Result<(), HarvesterError> {
    conn.execute("DELETE FROM slack_reactions WHERE message_id = ?1", params![message_id])?;
    for reaction in reactions {
        conn.execute(
            "INSERT INTO slack_reactions (message_id, emoji, count) VALUES (?1, ?2, ?3)",
            params![message_id, reaction.emoji, reaction.count],
        )?;
    }
    Ok(())
}

/// Append (or accumulate into) the one `ingestion_log` row for this
/// `(session_id, workspace, channel)` — §4.9's end-of-conversation
/// summary write. `UPSERT`s because a single session can ingest the same
/// channel's conversation in more than one batch.
pub fn record_ingestion_session_sync(conn: &Connection, row: &IngestionLogRow) -> Result<(), HarvesterError> {
    conn.execute(
        "INSERT INTO ingestion_log
            (session_id, workspace, channel, last_message_timestamp, message_count,
             new_messages, updated_messages, duplicate_messages)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(session_id, workspace, channel) DO UPDATE SET
            last_message_timestamp = excluded.last_message_timestamp,
            message_count = message_count + excluded.message_count,
            new_messages = new_messages + excluded.new_messages,
            updated_messages = updated_messages + excluded.updated_messages,
            duplicate_messages = duplicate_messages + excluded.duplicate_messages",
        params![
            row.session_id,
            row.workspace,
            row.channel,
            row.last_message_timestamp,
            row.message_count,
            row.new_messages,
            row.updated_messages,
            row.duplicate_messages,
        ],
    )?;
    Ok(())
}

/// Fetch a message by primary key, for tests and the thread-expansion
/// path that needs the parent row alongside its replies.
pub fn find_message_by_id_sync(conn: &Connection, id: &str) -> Result<Option<StoredMessage>, HarvesterError> {
    conn.query_row("SELECT * FROM slack_messages WHERE id = ?1", params![id], StoredMessage::from_row)
        .optional()
        .map_err(Into::into)
}

/// Parse an RFC 3339 timestamp the way `insert_new_message_sync` wrote
/// it, for round-tripping in tests.
pub fn parse_stored_timestamp(raw: &str) -> Result<DateTime<Local>, HarvesterError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| HarvesterError::Malformed(e.to_string()))
        .or_else(|_| parse_sqlite_datetime(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn conn() -> Connection {
        crate::db::pool::ensure_sqlite_vec_registered();
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::run_all_migrations(&conn).unwrap();
        conn
    }

    fn ts() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap()
    }

    fn sample<'a>(id: &'a str, content: &'a str, hash: &'a str) -> NewMessage<'a> {
        NewMessage {
            id,
            workspace: "Acme",
            channel: "#general",
            sender: "alice",
            content,
            timestamp: ts(),
            thread_ts: None,
            mentions: &[],
            attachment_names: &[],
            content_hash: hash,
        }
    }

    #[test]
    fn insert_then_find_by_logical_id() {
        let conn = conn();
        insert_new_message_sync(&conn, &sample("m1", "hi", "hash1")).unwrap();
        let found = find_by_logical_id_sync(&conn, "Acme", "#general", "m1").unwrap().unwrap();
        assert_eq!(found.content, "hi");
        assert_eq!(found.version, 1);
    }

    #[test]
    fn find_by_content_identity_ignores_timestamp() {
        let conn = conn();
        insert_new_message_sync(&conn, &sample("m1", "hi", "hash1")).unwrap();
        let found = find_by_content_identity_sync(&conn, "Acme", "#general", "alice", "hi").unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn update_bumps_version() {
        let conn = conn();
        insert_new_message_sync(&conn, &sample("m1", "hi", "hash1")).unwrap();
        update_message_content_sync(&conn, "Acme", "#general", "m1", "hi (edited)", "hash2").unwrap();
        let found = find_by_logical_id_sync(&conn, "Acme", "#general", "m1").unwrap().unwrap();
        assert_eq!(found.version, 2);
        assert_eq!(found.content, "hi (edited)");
        assert!(found.edited_at.is_some());
    }

    #[test]
    fn replace_reactions_is_idempotent_per_emoji() {
        let conn = conn();
        insert_new_message_sync(&conn, &sample("m1", "hi", "hash1")).unwrap();
        let reactions = vec![Reaction { emoji: "👍".into(), count: 2, reactors: vec![] }];
        replace_reactions_sync(&conn, "m1", &reactions).unwrap();
        replace_reactions_sync(&conn, "m1", &reactions).unwrap();
        let stored = reactions_for_message_sync(&conn, "m1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].count, 2);
    }

    #[test]
    fn ingestion_log_accumulates_across_batches() {
        let conn = conn();
        let row = IngestionLogRow {
            session_id: "s1".into(),
            workspace: "Acme".into(),
            channel: "#general".into(),
            last_message_timestamp: Some("2026-07-27T12:00:00".into()),
            message_count: 1,
            new_messages: 1,
            updated_messages: 0,
            duplicate_messages: 0,
        };
        record_ingestion_session_sync(&conn, &row).unwrap();
        record_ingestion_session_sync(&conn, &row).unwrap();

        let total: u32 = conn
            .query_row(
                "SELECT message_count FROM ingestion_log WHERE session_id = 's1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(total, 2);
    }
}
