// src/ingestion/mod.rs
// Ingestion pipeline (C9): takes a parsed `ConversationRecord` (C6) and
// writes it into the relational + vector store (C8), classifying every
// message through the dedup decision tree (C7) and maintaining the
// per-session `ingestion_log` counters.
//
// Message identity: apps rarely expose a stable message id to their
// accessibility tree, so one is derived here from `(sender, timestamp)`
// plus an ordinal disambiguating messages from the same sender parsed
// at the same timestamp (common when an app's displayed resolution is
// coarser than real send times). The ordinal depends on a message's
// position in the parsed batch, not its content, so an edited message
// keeps its id across re-parses as long as ingestion order is stable.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::warn;

use crate::db::messages::{
    NewMessage, find_by_content_identity_sync, find_by_logical_id_sync, insert_new_message_sync,
    reactions_for_message_sync, record_ingestion_session_sync, replace_reactions_sync, touch_message_sync,
    update_message_content_sync,
};
use crate::db::pool::DatabasePool;
use crate::db::types::{IngestionLogRow, StoredReaction};
use crate::dedup::{self, DedupDecision};
use crate::embeddings::EmbeddingClient;
use crate::error::HarvesterError;
use crate::hashstore::HashStore;
use crate::parsers::{ConversationRecord, MessageRecord, Reaction};

/// Per-message outcome, returned to the caller for observability and
/// folded into the conversation-level [`IngestResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    New,
    Updated,
    Duplicate,
    ReactionsUpdated,
}

/// Totals for one `ingest_conversation` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestResult {
    pub new_messages: u32,
    pub updated_messages: u32,
    pub duplicate_messages: u32,
    pub reactions_updated_messages: u32,
}

impl IngestResult {
    fn record(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::New => self.new_messages += 1,
            MessageOutcome::Updated => self.updated_messages += 1,
            MessageOutcome::Duplicate => self.duplicate_messages += 1,
            // Folded into `updated_messages` for the `ingestion_log` row: the
            // bit-exact DDL (schema.rs) has no dedicated reactions-updated
            // column, and a reaction change is an update in the same sense a
            // content edit is.
            MessageOutcome::ReactionsUpdated => {
                self.updated_messages += 1;
                self.reactions_updated_messages += 1;
            }
        }
    }

    fn total(&self) -> u32 {
        self.new_messages + self.updated_messages + self.duplicate_messages
    }
}

/// Orchestrates writes into the relational + vector store for parsed
/// conversations.
pub struct IngestionPipeline {
    pool: Arc<DatabasePool>,
    embeddings: Arc<EmbeddingClient>,
    hash_store: Option<Arc<Mutex<HashStore>>>,
}

impl IngestionPipeline {
    pub fn new(pool: Arc<DatabasePool>, embeddings: Arc<EmbeddingClient>) -> Self {
        Self { pool, embeddings, hash_store: None }
    }

    /// Attaches a hash-dedup store (C11). The store is never authoritative
    /// for the dedup decision — it's consulted only to log an early
    /// "already seen" signal, since a naive hash-only skip would silently
    /// miss reaction updates on content the store has already marked seen.
    pub fn with_hash_store(mut self, hash_store: Arc<Mutex<HashStore>>) -> Self {
        self.hash_store = Some(hash_store);
        self
    }

    /// Ingest every message in `conversation`, writing one accumulated
    /// `ingestion_log` row for `(session_id, workspace, channel)`.
    pub async fn ingest_conversation(
        &self,
        session_id: &str,
        workspace: &str,
        conversation: &ConversationRecord,
    ) -> Result<IngestResult, HarvesterError> {
        let ids = derive_message_ids(&conversation.messages);
        let mut result = IngestResult::default();
        let mut last_timestamp: Option<DateTime<Local>> = None;

        for (message, id) in conversation.messages.iter().zip(ids.into_iter()) {
            let outcome = self.ingest_one(workspace, &conversation.channel_name, &id, message).await?;
            result.record(outcome);
            last_timestamp = Some(match last_timestamp {
                Some(prev) if prev >= message.timestamp => prev,
                _ => message.timestamp,
            });

            if let Some(hash_store) = &self.hash_store {
                let hash_u64 = dedup::content_hash_u64(&message.sender, &message.content, message.timestamp);
                let mut store = hash_store.lock().await;
                let already_seen = store.contains(hash_u64, message.timestamp);
                if let Err(err) = store.insert(hash_u64, message.timestamp) {
                    warn!(error = %err, "failed to record hash in hash-dedup store");
                }
                if already_seen && outcome == MessageOutcome::New {
                    // The content hash prefix collided with something the
                    // store had on file, but the relational store (the
                    // authority) said this is genuinely new — a 64-bit
                    // prefix collision, not a missed duplicate. Worth a log
                    // line, not a behavior change.
                    warn!("hash-dedup store flagged a probable collision for a message classified NEW");
                }
            }
        }

        if result.total() > 0 {
            let row = IngestionLogRow {
                session_id: session_id.to_string(),
                workspace: workspace.to_string(),
                channel: conversation.channel_name.clone(),
                last_message_timestamp: last_timestamp.map(|t| t.to_rfc3339()),
                message_count: result.total(),
                new_messages: result.new_messages,
                updated_messages: result.updated_messages,
                duplicate_messages: result.duplicate_messages,
            };
            self.pool
                .run_with_retry(move |conn| record_ingestion_session_sync(conn, &row))
                .await?;
        }

        Ok(result)
    }

    async fn ingest_one(
        &self,
        workspace: &str,
        channel: &str,
        id: &str,
        message: &MessageRecord,
    ) -> Result<MessageOutcome, HarvesterError> {
        let canonical_content = dedup::canonicalize_content(&message.content);
        let hash = dedup::content_hash(&message.sender, &message.content, message.timestamp);

        let workspace_owned = workspace.to_string();
        let channel_owned = channel.to_string();
        let id_owned = id.to_string();
        let sender_owned = message.sender.clone();
        let content_owned = canonical_content.clone();
        let hash_owned = hash.clone();
        let timestamp = message.timestamp;
        let thread_ts = message.metadata.thread_id.clone();
        let mentions = extract_mentions(&message.content);
        let attachments = message.metadata.attachments.clone();
        let reactions = message.metadata.reactions.clone();

        let write = WriteRequest {
            workspace: workspace_owned,
            channel: channel_owned,
            id: id_owned,
            sender: sender_owned,
            content: content_owned,
            content_hash: hash_owned,
            timestamp,
            thread_ts,
            mentions,
            attachments,
            reactions,
        };

        let write_for_closure = write.clone();
        let outcome = self
            .pool
            .run_with_retry(move |conn| apply_write_sync(conn, &write_for_closure))
            .await?;

        if matches!(outcome, MessageOutcome::New | MessageOutcome::Updated) {
            let pool = self.pool.clone();
            let embeddings = self.embeddings.clone();
            let message_id = write.logical_row_id();
            let text = write.content.clone();
            match embeddings.embed(&text).await {
                Ok(vector) => {
                    let message_id_for_insert = message_id.clone();
                    if let Err(err) = pool
                        .run_with_retry(move |conn| {
                            crate::db::embeddings::insert_embedding_sync(conn, &message_id_for_insert, &vector)
                        })
                        .await
                    {
                        warn!(error = %err, message_id = %message_id, "failed to persist embedding");
                    }
                }
                Err(err) => {
                    // Embedding failures are non-fatal to ingestion (§3):
                    // the message is still stored and searchable by keyword.
                    warn!(error = %err, message_id = %message_id, "embedding unavailable, message stored without one");
                }
            }
        }

        Ok(outcome)
    }
}

#[derive(Debug, Clone)]
struct WriteRequest {
    workspace: String,
    channel: String,
    id: String,
    sender: String,
    content: String,
    content_hash: String,
    timestamp: DateTime<Local>,
    thread_ts: Option<String>,
    mentions: Vec<String>,
    attachments: Vec<String>,
    reactions: Vec<Reaction>,
}

impl WriteRequest {
    /// Best-effort id to key the embedding row on: the logical id this
    /// request targets. `apply_write_sync` may resolve to a different
    /// existing row (the content-identity fallback), in which case the
    /// embedding is keyed on `self.id` regardless — a harmless mismatch
    /// since `insert_embedding_sync` replaces by `message_id` and the next
    /// re-parse of the same logical message will reconcile it.
    fn logical_row_id(&self) -> String {
        self.id.clone()
    }
}

fn apply_write_sync(
    conn: &rusqlite::Connection,
    req: &WriteRequest,
) -> Result<MessageOutcome, HarvesterError> {
    let tx = conn.unchecked_transaction()?;

    // Content identity first (§4.7/§4.9): a row sharing
    // `(workspace, channel, sender, content)` is the same message seen
    // again, possibly with a jittered timestamp from the app re-rendering
    // it — comparing reaction sets tells duplicate from reactions-updated
    // without the timestamp ever entering the decision. Only when no such
    // row exists do we fall back to the logical id, which is what catches
    // a true edit (same id, different content).
    let by_content =
        find_by_content_identity_sync(&tx, &req.workspace, &req.channel, &req.sender, &req.content)?;

    let outcome = match by_content {
        Some(row) => {
            let existing_reactions = reactions_for_message_sync(&tx, &row.id)?;
            let decision = dedup::classify(
                &as_message_record(req),
                Some(&as_reaction_list(&existing_reactions)),
            );
            match decision {
                DedupDecision::ReactionsUpdated => {
                    replace_reactions_sync(&tx, &row.id, &req.reactions)?;
                    touch_message_sync(&tx, &row.id)?;
                    MessageOutcome::ReactionsUpdated
                }
                // `classify` only returns `New`/`Updated` when `existing` is
                // `None`, which can't happen in this arm.
                _ => MessageOutcome::Duplicate,
            }
        }
        None => match find_by_logical_id_sync(&tx, &req.workspace, &req.channel, &req.id)? {
            Some(row) => {
                update_message_content_sync(&tx, &req.workspace, &req.channel, &row.id, &req.content, &req.content_hash)?;
                replace_reactions_sync(&tx, &row.id, &req.reactions)?;
                MessageOutcome::Updated
            }
            None => {
                insert_new_message_sync(
                    &tx,
                    &NewMessage {
                        id: &req.id,
                        workspace: &req.workspace,
                        channel: &req.channel,
                        sender: &req.sender,
                        content: &req.content,
                        timestamp: req.timestamp,
                        thread_ts: req.thread_ts.as_deref(),
                        mentions: &req.mentions,
                        attachment_names: &req.attachments,
                        content_hash: &req.content_hash,
                    },
                )?;
                if !req.reactions.is_empty() {
                    replace_reactions_sync(&tx, &req.id, &req.reactions)?;
                }
                MessageOutcome::New
            }
        },
    };

    tx.commit()?;
    Ok(outcome)
}

fn as_reaction_list(stored: &[StoredReaction]) -> Vec<Reaction> {
    stored.iter().map(|r| Reaction { emoji: r.emoji.clone(), count: r.count, reactors: vec![] }).collect()
}

fn as_message_record(req: &WriteRequest) -> MessageRecord {
    use crate::parsers::{MessageMetadata, MessageType};
    MessageRecord {
        sender: req.sender.clone(),
        content: req.content.clone(),
        timestamp: req.timestamp,
        message_type: MessageType::Text,
        metadata: MessageMetadata { reactions: req.reactions.clone(), ..Default::default() },
    }
}

/// Matches `@name`-style mentions in rendered message text. Apps that
/// expose richer mention metadata should prefer that where available;
/// this is the lowest-common-denominator fallback every app's plain text
/// supports.
fn extract_mentions(content: &str) -> Vec<String> {
    static MENTION_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = MENTION_RE.get_or_init(|| regex::Regex::new(r"@([A-Za-z0-9_][A-Za-z0-9_.\-]*)").unwrap());
    re.captures_iter(content).map(|c| c[1].to_string()).collect()
}

/// Assigns each message a stable id: a hex rendering of its nanosecond
/// timestamp, a short hash of its sender, and an ordinal disambiguating
/// messages from the same sender parsed at the identical timestamp.
fn derive_message_ids(messages: &[MessageRecord]) -> Vec<String> {
    let mut seen: HashMap<(String, i64), u32> = HashMap::new();
    messages
        .iter()
        .map(|m| {
            let nanos = m.timestamp.timestamp_nanos_opt().unwrap_or_else(|| m.timestamp.timestamp() * 1_000_000_000);
            let key = (m.sender.clone(), nanos);
            let ordinal = seen.entry(key).or_insert(0);
            let id = format_message_id(&m.sender, nanos, *ordinal);
            *ordinal += 1;
            id
        })
        .collect()
}

fn format_message_id(sender: &str, nanos: i64, ordinal: u32) -> String {
    let sender_hash = Sha256::digest(sender.as_bytes());
    let sender_prefix: String = sender_hash.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("{nanos:x}-{sender_prefix}-{ordinal}")
}
