// src/query/mod.rs
// Query engine (C10): structured filters, keyword search, vector k-NN,
// a hybrid merge of the two, thread expansion, and time-windowed
// conversation chunking — everything layered on top of the low-level
// SQL in `crate::db::search`/`crate::db::embeddings`.

use std::sync::Arc;

use chrono::Duration;

use crate::db::embeddings::{VectorHit, knn_search_sync};
use crate::db::messages::find_message_by_id_sync;
use crate::db::pool::DatabasePool;
use crate::db::search::{
    StructuredFilter, expand_thread_sync, messages_in_window_sync, structured_search_sync,
};
use crate::db::types::StoredMessage;
use crate::embeddings::EmbeddingClient;
use crate::error::HarvesterError;

/// Default time gap (seconds) past which two consecutive messages in the
/// same channel are split into separate conversation chunks (§4.10).
pub const DEFAULT_CHUNK_WINDOW_SECS: i64 = 600;

/// A structured-filter or keyword search result carries no extra score;
/// ordering is newest-first straight out of SQL. Re-exported here so
/// callers don't need to reach into `crate::db`.
pub use crate::db::search::StructuredFilter as Filter;

/// One semantic search hit: the stored message plus its cosine distance
/// from the query vector (lower is closer).
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub message: StoredMessage,
    pub distance: f32,
}

/// One hybrid-search hit, tagged with which path surfaced it. A message
/// matched by both paths keeps its semantic tag and distance — semantic
/// hits are deduplicated in first, so a later keyword match on the same
/// message is simply dropped rather than recorded as a second tag.
#[derive(Debug, Clone)]
pub enum HybridHit {
    Semantic { message: StoredMessage, distance: f32 },
    Keyword { message: StoredMessage },
}

impl HybridHit {
    pub fn message(&self) -> &StoredMessage {
        match self {
            HybridHit::Semantic { message, .. } => message,
            HybridHit::Keyword { message } => message,
        }
    }
}

/// Composes the low-level SQL primitives into the query engine's public
/// operations.
pub struct QueryEngine {
    pool: Arc<DatabasePool>,
    embeddings: Arc<EmbeddingClient>,
}

impl QueryEngine {
    pub fn new(pool: Arc<DatabasePool>, embeddings: Arc<EmbeddingClient>) -> Self {
        Self { pool, embeddings }
    }

    /// Structured filter search (§4.10): workspace/channel/sender/time
    /// window/keyword/has-reactions, newest-first, capped at `limit`.
    pub async fn structured_search(
        &self,
        filter: StructuredFilter,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, HarvesterError> {
        self.pool.run(move |conn| structured_search_sync(conn, &filter, limit)).await
    }

    /// Plain keyword search, newest-first.
    pub async fn keyword_search(&self, keyword: &str, limit: usize) -> Result<Vec<StoredMessage>, HarvesterError> {
        let keyword = keyword.to_string();
        self.pool
            .run(move |conn| {
                structured_search_sync(
                    conn,
                    &StructuredFilter { keyword: Some(keyword), ..Default::default() },
                    limit,
                )
            })
            .await
    }

    /// A message's full thread (root + replies), oldest-first.
    pub async fn expand_thread(&self, thread_ts: &str) -> Result<Vec<StoredMessage>, HarvesterError> {
        let thread_ts = thread_ts.to_string();
        self.pool.run(move |conn| expand_thread_sync(conn, &thread_ts)).await
    }

    /// Vector k-NN search: embeds `query_text`, finds the `k` nearest
    /// stored embeddings, and joins back to their message rows. Hits
    /// whose message row has since been deleted are silently dropped
    /// (the vector table has no foreign key to enforce this for us).
    pub async fn semantic_search(&self, query_text: &str, k: usize) -> Result<Vec<SemanticHit>, HarvesterError> {
        let query_vector = self.embeddings.embed(query_text).await?;
        let hits: Vec<VectorHit> = self.pool.run(move |conn| knn_search_sync(conn, &query_vector, k)).await?;

        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let message_id = hit.message_id.clone();
            let message = self.pool.run(move |conn| find_message_by_id_sync(conn, &message_id)).await?;
            if let Some(message) = message {
                out.push(SemanticHit { message, distance: hit.distance });
            }
        }
        Ok(out)
    }

    /// Hybrid search (§4.10): oversamples the vector index by `2 * limit`
    /// so enough semantic matches survive the merge with keyword results,
    /// then sorts the union by `(is_semantic, timestamp)` descending —
    /// every semantic hit outranks every keyword-only hit regardless of
    /// distance, and within each group the newest message wins.
    pub async fn hybrid_search(
        &self,
        query_text: &str,
        filter: StructuredFilter,
        limit: usize,
    ) -> Result<Vec<HybridHit>, HarvesterError> {
        let semantic = self.semantic_search(query_text, limit * 2).await.unwrap_or_else(|err| {
            // Embedding/vector-search failure degrades to keyword-only
            // results rather than failing the whole query.
            tracing::warn!(error = %err, "semantic search unavailable, falling back to keyword-only hybrid search");
            Vec::new()
        });

        let mut seen: std::collections::HashSet<String> =
            semantic.iter().map(|hit| hit.message.id.clone()).collect();

        let mut merged: Vec<HybridHit> = semantic
            .into_iter()
            .map(|hit| HybridHit::Semantic { message: hit.message, distance: hit.distance })
            .collect();

        let keyword_filter = StructuredFilter { keyword: Some(query_text.to_string()), ..filter };
        let keyword_hits = self.structured_search(keyword_filter, limit * 2).await?;
        for message in keyword_hits {
            if seen.insert(message.id.clone()) {
                merged.push(HybridHit::Keyword { message });
            }
        }

        merged.sort_by(|a, b| {
            let a_semantic = matches!(a, HybridHit::Semantic { .. });
            let b_semantic = matches!(b, HybridHit::Semantic { .. });
            b_semantic.cmp(&a_semantic).then(b.message().timestamp.cmp(&a.message().timestamp))
        });
        merged.truncate(limit);

        Ok(merged)
    }

    /// All messages in `(workspace, channel)` between `since` and `until`,
    /// split into chunks by [`chunk_by_time_gap`] at the default window.
    pub async fn conversation_chunks(
        &self,
        workspace: &str,
        channel: &str,
        since: &str,
        until: &str,
    ) -> Result<Vec<Vec<StoredMessage>>, HarvesterError> {
        let (workspace, channel, since, until) =
            (workspace.to_string(), channel.to_string(), since.to_string(), until.to_string());
        let messages = self
            .pool
            .run(move |conn| messages_in_window_sync(conn, &workspace, &channel, &since, &until))
            .await?;
        Ok(chunk_by_time_gap(messages, DEFAULT_CHUNK_WINDOW_SECS))
    }
}

/// Splits `messages` (already ordered oldest-first) into chunks, starting
/// a new chunk whenever the gap to the previous message reaches
/// `window_secs` or more. Pure and deterministic — the conversation-
/// chunking half of §4.10 that doesn't need a database connection.
///
/// Boundary is inclusive of the window (gap `>= window_secs` splits, not
/// just gap `> window_secs`): §8's worked example gives timestamps
/// `[t, t+100, t+700, t+701]` with a 600s window resolving to
/// `[[0,1],[2,3]]` — the exact 600s gap between index 1 and 2 must start
/// a new chunk.
pub fn chunk_by_time_gap(messages: Vec<StoredMessage>, window_secs: i64) -> Vec<Vec<StoredMessage>> {
    let window = Duration::seconds(window_secs);
    let mut chunks: Vec<Vec<StoredMessage>> = Vec::new();

    for message in messages {
        let starts_new_chunk = match chunks.last().and_then(|chunk| chunk.last()) {
            Some(prev) => message.timestamp - prev.timestamp >= window,
            None => true,
        };
        if starts_new_chunk {
            chunks.push(vec![message]);
        } else {
            chunks.last_mut().expect("just checked non-empty").push(message);
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::messages::{NewMessage, insert_new_message_sync};
    use chrono::{Local, TimeZone};

    fn ts(sec: i64) -> chrono::DateTime<Local> {
        Local.timestamp_opt(1_800_000_000 + sec, 0).unwrap()
    }

    fn stored(id: &str, sec: i64) -> StoredMessage {
        StoredMessage {
            id: id.to_string(),
            workspace: "Acme".into(),
            channel: "#general".into(),
            sender: "alice".into(),
            content: "hi".into(),
            timestamp: ts(sec),
            thread_ts: None,
            mentions: vec![],
            attachment_names: vec![],
            content_hash: "h".into(),
            version: 1,
            edited_at: None,
            ingested_at: ts(sec),
            updated_at: ts(sec),
            date_only: "2026-07-27".into(),
            month_year: "2026-07".into(),
            day_of_week: "1".into(),
        }
    }

    #[test]
    fn chunk_by_time_gap_splits_on_large_gaps() {
        let messages = vec![stored("m1", 0), stored("m2", 30), stored("m3", 10_000)];
        let chunks = chunk_by_time_gap(messages, DEFAULT_CHUNK_WINDOW_SECS);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[1].len(), 1);
    }

    #[test]
    fn chunk_by_time_gap_single_chunk_when_all_close() {
        let messages = vec![stored("m1", 0), stored("m2", 60), stored("m3", 120)];
        let chunks = chunk_by_time_gap(messages, DEFAULT_CHUNK_WINDOW_SECS);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 3);
    }

    #[test]
    fn chunk_by_time_gap_empty_input_yields_no_chunks() {
        assert!(chunk_by_time_gap(vec![], DEFAULT_CHUNK_WINDOW_SECS).is_empty());
    }

    #[test]
    fn chunk_by_time_gap_spec_worked_example() {
        // §8 property 11: timestamps [t, t+100, t+700, t+701], window 600
        // -> chunks [[0,1],[2,3]]. The gap between index 1 and 2 is
        // exactly 600s and must still start a new chunk.
        let messages = vec![stored("m0", 0), stored("m1", 100), stored("m2", 700), stored("m3", 701)];
        let chunks = chunk_by_time_gap(messages, 600);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["m0", "m1"]);
        assert_eq!(chunks[1].iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["m2", "m3"]);
    }

    async fn engine() -> QueryEngine {
        let pool = Arc::new(DatabasePool::open_in_memory().await.unwrap());
        QueryEngine::new(pool, Arc::new(EmbeddingClient::deterministic()))
    }

    fn insert(conn: &rusqlite::Connection, id: &str, sender: &str, content: &str, sec: i64) {
        insert_new_message_sync(
            conn,
            &NewMessage {
                id,
                workspace: "Acme",
                channel: "#general",
                sender,
                content,
                timestamp: ts(sec),
                thread_ts: None,
                mentions: &[],
                attachment_names: &[],
                content_hash: "h",
            },
        )
        .unwrap();
    }

    #[tokio::test]
    async fn keyword_search_finds_matching_messages() {
        let engine = engine().await;
        engine.pool.run(|conn| -> Result<(), HarvesterError> {
            insert(conn, "m1", "alice", "deploy the service", 0);
            insert(conn, "m2", "alice", "unrelated", 1);
            Ok(())
        }).await.unwrap();

        let hits = engine.keyword_search("deploy", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1");
    }

    #[tokio::test]
    async fn hybrid_search_falls_back_to_keyword_when_nothing_embedded() {
        let engine = engine().await;
        engine.pool.run(|conn| -> Result<(), HarvesterError> {
            insert(conn, "m1", "alice", "deploy the service", 0);
            Ok(())
        }).await.unwrap();

        let hits = engine.hybrid_search("deploy", StructuredFilter::default(), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(matches!(hits[0], HybridHit::Keyword { .. }));
    }

    #[tokio::test]
    async fn hybrid_search_ranks_semantic_hits_above_keyword_hits() {
        let engine = engine().await;
        // Older message, but given an embedding identical to the query
        // vector so it surfaces as an exact semantic hit.
        let query_vector = engine.embeddings.embed("deploy").await.unwrap();
        engine
            .pool
            .run(move |conn| -> Result<(), HarvesterError> {
                insert(conn, "m1", "alice", "deploy", 0);
                crate::db::embeddings::insert_embedding_sync(conn, "m1", &query_vector)?;
                // Newer message, keyword-only match: shares the word but
                // carries no embedding row at all.
                insert(conn, "m2", "alice", "deploy rollback", 1000);
                Ok(())
            })
            .await
            .unwrap();

        let hits = engine.hybrid_search("deploy", StructuredFilter::default(), 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(matches!(hits[0], HybridHit::Semantic { .. }));
        assert_eq!(hits[0].message().id, "m1");
        assert!(matches!(hits[1], HybridHit::Keyword { .. }));
        assert_eq!(hits[1].message().id, "m2");
    }

    #[tokio::test]
    async fn hybrid_search_truncates_to_limit_after_oversampling() {
        let engine = engine().await;
        engine
            .pool
            .run(|conn| -> Result<(), HarvesterError> {
                for i in 0..6 {
                    insert(conn, &format!("m{i}"), "alice", "deploy", i);
                }
                Ok(())
            })
            .await
            .unwrap();

        // The internal fetch oversamples by 2x limit on both paths, but
        // the caller-facing result is still capped at `limit`.
        let hits = engine.hybrid_search("deploy", StructuredFilter::default(), 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
