// src/db/search.rs
// Low-level synchronous SQL for the query engine (C10): structured
// filters, keyword search, and thread expansion against
// `slack_messages`/`slack_reactions`. Hybrid merge and conversation
// chunking live one layer up in `crate::query`, which composes these
// primitives.

use rusqlite::{Connection, ToSql};

use crate::db::types::StoredMessage;
use crate::error::HarvesterError;

/// Structured filter set for `structured_search_sync` (§4.10's
/// "structured filters": workspace/channel/sender/time-window/keyword).
/// Every field is optional; omitted fields impose no constraint.
#[derive(Debug, Clone, Default)]
pub struct StructuredFilter {
    pub workspace: Option<String>,
    pub channel: Option<String>,
    pub senders: Vec<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub keyword: Option<String>,
    pub has_reactions: bool,
}

/// Run a structured query, newest-first, capped at `limit` rows.
pub fn structured_search_sync(
    conn: &Connection,
    filter: &StructuredFilter,
    limit: usize,
) -> Result<Vec<StoredMessage>, HarvesterError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ws) = &filter.workspace {
        clauses.push("workspace = ?".into());
        args.push(Box::new(ws.clone()));
    }
    if let Some(ch) = &filter.channel {
        clauses.push("channel = ?".into());
        args.push(Box::new(ch.clone()));
    }
    if !filter.senders.is_empty() {
        let placeholders = vec!["?"; filter.senders.len()].join(", ");
        clauses.push(format!("sender IN ({placeholders})"));
        for s in &filter.senders {
            args.push(Box::new(s.clone()));
        }
    }
    if let Some(since) = &filter.since {
        clauses.push("timestamp >= ?".into());
        args.push(Box::new(since.clone()));
    }
    if let Some(until) = &filter.until {
        clauses.push("timestamp <= ?".into());
        args.push(Box::new(until.clone()));
    }
    if let Some(keyword) = &filter.keyword {
        clauses.push("content LIKE ? ESCAPE '\\'".into());
        args.push(Box::new(format!("%{}%", escape_like(keyword))));
    }
    if filter.has_reactions {
        clauses.push("EXISTS (SELECT 1 FROM slack_reactions r WHERE r.message_id = slack_messages.id)".into());
    }

    let where_clause = if clauses.is_empty() { String::new() } else { format!("WHERE {}", clauses.join(" AND ")) };

    let sql = format!(
        "SELECT * FROM slack_messages {where_clause} ORDER BY timestamp DESC LIMIT ?"
    );
    args.push(Box::new(limit as i64));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = args.iter().map(|b| b.as_ref()).collect();
    let rows = stmt.query_map(param_refs.as_slice(), StoredMessage::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Escape `%`/`_`/`\` so a user's search term can't widen a `LIKE` match
/// beyond its literal characters.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Plain keyword search: same as `structured_search_sync` with only
/// `keyword` set, kept as its own entry point since it's the query
/// engine's most common case (§4.10).
pub fn keyword_search_sync(
    conn: &Connection,
    keyword: &str,
    limit: usize,
) -> Result<Vec<StoredMessage>, HarvesterError> {
    structured_search_sync(
        conn,
        &StructuredFilter { keyword: Some(keyword.to_string()), ..Default::default() },
        limit,
    )
}

/// A message's full thread: the root plus every reply sharing its
/// `thread_ts`, oldest-first (§4.10's thread expansion).
pub fn expand_thread_sync(conn: &Connection, thread_ts: &str) -> Result<Vec<StoredMessage>, HarvesterError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM slack_messages WHERE thread_ts = ?1 OR id = ?1 ORDER BY timestamp ASC",
    )?;
    let rows = stmt.query_map(rusqlite::params![thread_ts], StoredMessage::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// All messages in `(workspace, channel)` between `since` and `until`
/// inclusive, oldest-first — the raw material for conversation chunking.
pub fn messages_in_window_sync(
    conn: &Connection,
    workspace: &str,
    channel: &str,
    since: &str,
    until: &str,
) -> Result<Vec<StoredMessage>, HarvesterError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM slack_messages
         WHERE workspace = ?1 AND channel = ?2 AND timestamp BETWEEN ?3 AND ?4
         ORDER BY timestamp ASC",
    )?;
    let rows = stmt.query_map(
        rusqlite::params![workspace, channel, since, until],
        StoredMessage::from_row,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        crate::db::pool::ensure_sqlite_vec_registered();
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::run_all_migrations(&conn).unwrap();
        conn
    }

    fn insert(conn: &Connection, id: &str, sender: &str, content: &str, ts: &str, thread_ts: Option<&str>) {
        conn.execute(
            "INSERT INTO slack_messages (id, workspace, channel, sender, content, timestamp, thread_ts, content_hash)
             VALUES (?1, 'Acme', '#general', ?2, ?3, ?4, ?5, 'h')",
            rusqlite::params![id, sender, content, ts, thread_ts],
        )
        .unwrap();
    }

    #[test]
    fn structured_search_filters_by_sender_and_keyword() {
        let conn = conn();
        insert(&conn, "m1", "alice", "deploy the service", "2026-07-27 10:00:00", None);
        insert(&conn, "m2", "bob", "deploy the service", "2026-07-27 10:01:00", None);
        insert(&conn, "m3", "alice", "unrelated chatter", "2026-07-27 10:02:00", None);

        let results = structured_search_sync(
            &conn,
            &StructuredFilter {
                senders: vec!["alice".into()],
                keyword: Some("deploy".into()),
                ..Default::default()
            },
            10,
        )
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
    }

    #[test]
    fn structured_search_orders_newest_first_and_respects_limit() {
        let conn = conn();
        insert(&conn, "m1", "alice", "a", "2026-07-27 10:00:00", None);
        insert(&conn, "m2", "alice", "b", "2026-07-27 10:05:00", None);
        insert(&conn, "m3", "alice", "c", "2026-07-27 10:10:00", None);

        let results = structured_search_sync(&conn, &StructuredFilter::default(), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "m3");
        assert_eq!(results[1].id, "m2");
    }

    #[test]
    fn keyword_search_escapes_like_wildcards() {
        let conn = conn();
        insert(&conn, "m1", "alice", "100% done", "2026-07-27 10:00:00", None);
        insert(&conn, "m2", "alice", "done deal", "2026-07-27 10:01:00", None);

        let results = keyword_search_sync(&conn, "100%", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
    }

    #[test]
    fn has_reactions_filters_to_reacted_messages() {
        let conn = conn();
        insert(&conn, "m1", "alice", "a", "2026-07-27 10:00:00", None);
        insert(&conn, "m2", "alice", "b", "2026-07-27 10:01:00", None);
        conn.execute(
            "INSERT INTO slack_reactions (message_id, emoji, count) VALUES ('m1', '👍', 1)",
            [],
        )
        .unwrap();

        let results =
            structured_search_sync(&conn, &StructuredFilter { has_reactions: true, ..Default::default() }, 10)
                .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
    }

    #[test]
    fn expand_thread_returns_root_and_replies_oldest_first() {
        let conn = conn();
        insert(&conn, "root", "alice", "start", "2026-07-27 10:00:00", None);
        insert(&conn, "reply2", "bob", "second", "2026-07-27 10:05:00", Some("root"));
        insert(&conn, "reply1", "carol", "first", "2026-07-27 10:02:00", Some("root"));

        let thread = expand_thread_sync(&conn, "root").unwrap();
        let ids: Vec<&str> = thread.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "reply1", "reply2"]);
    }

    #[test]
    fn messages_in_window_bounds_are_inclusive() {
        let conn = conn();
        insert(&conn, "m1", "alice", "a", "2026-07-27 09:59:00", None);
        insert(&conn, "m2", "alice", "b", "2026-07-27 10:00:00", None);
        insert(&conn, "m3", "alice", "c", "2026-07-27 11:00:00", None);
        insert(&conn, "m4", "alice", "d", "2026-07-27 11:00:01", None);

        let results = messages_in_window_sync(
            &conn,
            "Acme",
            "#general",
            "2026-07-27 10:00:00",
            "2026-07-27 11:00:00",
        )
        .unwrap();
        let ids: Vec<&str> = results.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m3"]);
    }
}
