//! Deduplication keys & hashing (C7).
//!
//! Every message gets a content hash over a canonicalized
//! `sender|\u{1}|content|\u{1}|timestamp` tuple. The hash is what the
//! relational store's `content_hash` column and the C11 hash-dedup store
//! both key on; canonicalization exists so the same message re-rendered
//! by the OS (extra whitespace, a zero-width joiner the app inserted)
//! still hashes identically.

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

use crate::parsers::{MessageRecord, Reaction};

/// Characters apps sometimes interleave into rendered text without
/// changing its meaning: zero-width space, zero-width non-joiner/joiner,
/// left-to-right mark, non-breaking space.
const INVISIBLE_CHARS: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{200E}', '\u{00A0}'];

/// Collapse internal whitespace runs to a single space, trim, and strip
/// invisible formatting characters some apps inject.
pub fn canonicalize_content(content: &str) -> String {
    let stripped: String = content.chars().filter(|c| !INVISIBLE_CHARS.contains(c)).collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim().to_string()
}

/// The exact byte string hashed: `sender|\u{1}|content|\u{1}|timestamp`,
/// with `content` canonicalized and `timestamp` rendered as RFC 3339.
fn canonical_key(sender: &str, content: &str, timestamp: DateTime<Local>) -> String {
    format!(
        "{}\u{1}{}\u{1}{}",
        sender.trim(),
        canonicalize_content(content),
        timestamp.to_rfc3339()
    )
}

/// SHA-256 content hash, hex-encoded, for the relational store's
/// `content_hash` column.
pub fn content_hash(sender: &str, content: &str, timestamp: DateTime<Local>) -> String {
    let key = canonical_key(sender, content, timestamp);
    let digest = Sha256::digest(key.as_bytes());
    hex_encode(&digest)
}

/// The same hash truncated to its first 8 bytes, interpreted as a
/// big-endian `u64` — the compact key the C11 hash-dedup store indexes,
/// traded off against the relational store's full hex digest for size.
pub fn content_hash_u64(sender: &str, content: &str, timestamp: DateTime<Local>) -> u64 {
    let key = canonical_key(sender, content, timestamp);
    let digest = Sha256::digest(key.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is at least 8 bytes"))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// The outcome of comparing a freshly-parsed message against whatever the
/// store already has for its content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// No existing row shares this content hash — insert it.
    New,
    /// A row exists with this hash, but its content/sender/timestamp
    /// differ from what the store has on file under the same identity —
    /// a rare case (hash collision aside, this only happens if a message
    /// was edited without changing the hashed fields, e.g. a formatting
    /// change) — treated as an update rather than a duplicate.
    Updated,
    /// Same content hash and the same reaction set — true duplicate,
    /// re-observed because the window was reparsed. Nothing to write.
    Duplicate,
    /// Same content hash, but the reaction set has changed since the
    /// stored row — update only the reactions.
    ReactionsUpdated,
}

/// Compare a parsed message's reactions against the store's last-known
/// reactions for the same content hash, deciding what work (if any) the
/// ingestion pipeline needs to do.
///
/// `existing` is `None` when no row has this content hash yet.
pub fn classify(new: &MessageRecord, existing: Option<&[Reaction]>) -> DedupDecision {
    match existing {
        None => DedupDecision::New,
        Some(existing_reactions) => {
            if reactions_equal(existing_reactions, &new.metadata.reactions) {
                DedupDecision::Duplicate
            } else {
                DedupDecision::ReactionsUpdated
            }
        }
    }
}

fn reactions_equal(a: &[Reaction], b: &[Reaction]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a_sorted: Vec<(&str, u32)> = a.iter().map(|r| (r.emoji.as_str(), r.count)).collect();
    let mut b_sorted: Vec<(&str, u32)> = b.iter().map(|r| (r.emoji.as_str(), r.count)).collect();
    a_sorted.sort_unstable();
    b_sorted.sort_unstable();
    a_sorted == b_sorted
}
