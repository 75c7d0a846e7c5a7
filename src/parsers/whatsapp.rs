// src/parsers/whatsapp.rs
// WhatsApp Desktop packs its entire message grammar into one accessibility
// description string per row rather than exposing separate sender/body/time
// elements, so this parser does not go through the generic bubble grammar —
// it locates the open chat pane by role description and parses each row's
// description text directly.

use async_trait::async_trait;
use chrono::Local;

use crate::accessibility::ElementHandle;
use crate::dates::parse_app_timestamp;
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::common::text_of;
use super::types::{
    AppKind, AppParser, ChannelType, ConversationRecord, MessageMetadata, MessageRecord,
    MessageType, ParseResult,
};

pub struct WhatsAppParser;

/// Trailing status markers WhatsApp appends to a row's description,
/// comma-separated, zero or more at a time. `"Red"` is kept verbatim: it is
/// the literal string WhatsApp's own accessibility layer emits, an apparent
/// typo for "Read" that must not be silently corrected.
const STATUS_MARKERS: &[&str] = &["Read", "Red", "Delivered", "Starred", "Edited", "Pinned"];

/// One of the eleven fixed row-description prefixes WhatsApp uses to open a
/// message's description string.
struct PrefixRule {
    prefix: &'static str,
    has_name: bool,
    is_self: bool,
}

const PREFIXES: &[PrefixRule] = &[
    PrefixRule { prefix: "message,", has_name: false, is_self: false },
    PrefixRule { prefix: "Message from", has_name: true, is_self: false },
    PrefixRule { prefix: "Replying to", has_name: true, is_self: false },
    PrefixRule { prefix: "Forwarded.", has_name: false, is_self: false },
    PrefixRule { prefix: "Video,", has_name: false, is_self: false },
    PrefixRule { prefix: "Video from", has_name: true, is_self: false },
    PrefixRule { prefix: "Photo,", has_name: false, is_self: false },
    PrefixRule { prefix: "Photo from", has_name: true, is_self: false },
    PrefixRule { prefix: "Your message,", has_name: false, is_self: true },
    PrefixRule { prefix: "Your video,", has_name: false, is_self: true },
    PrefixRule { prefix: "Your photo,", has_name: false, is_self: true },
];

/// Strip zero or more trailing `", MARKER"` suffixes, in whatever order the
/// description renders them.
fn strip_trailing_status_markers(text: &str) -> &str {
    let mut rest = text.trim_end();
    loop {
        let mut stripped = None;
        for marker in STATUS_MARKERS {
            if let Some(prefix) = rest.strip_suffix(marker.to_owned().as_str()) {
                let prefix = prefix.trim_end();
                if let Some(p) = prefix.strip_suffix(',') {
                    stripped = Some(p.trim_end());
                    break;
                }
            }
        }
        match stripped {
            Some(next) => rest = next,
            None => break,
        }
    }
    rest
}

struct ParsedRow {
    sender: String,
    conversation_name: Option<String>,
    content: String,
    timestamp: Option<chrono::DateTime<Local>>,
}

fn parse_description(description: &str, reference: chrono::DateTime<Local>) -> Option<ParsedRow> {
    let body = strip_trailing_status_markers(description.trim());

    let rule = PREFIXES.iter().find(|r| body.starts_with(r.prefix))?;
    let after_prefix = body[rule.prefix.len()..].trim_start();

    let (name, remainder) = if rule.has_name {
        let (name, rest) = after_prefix.split_once(',')?;
        (Some(name.trim().to_string()), rest)
    } else {
        (None, after_prefix)
    };

    let fields: Vec<&str> = remainder
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    let (content_field, rest_fields) = fields.split_first()?;
    let content = content_field.to_string();

    let mut received_from = None;
    let mut timestamp = None;
    for field in rest_fields {
        if let Some(who) = field.strip_prefix("Received from ") {
            received_from = Some(who.trim().to_string());
            continue;
        }
        if timestamp.is_none() {
            timestamp = parse_app_timestamp(field, reference);
        }
    }
    if timestamp.is_none() {
        timestamp = parse_app_timestamp(&rest_fields.join(" "), reference);
    }

    let sender = if rule.is_self {
        "You".to_string()
    } else if let Some(who) = received_from.clone() {
        who
    } else if let Some(n) = name.clone() {
        n
    } else {
        "unknown".to_string()
    };

    Some(ParsedRow { sender, conversation_name: name, content, timestamp })
}

#[async_trait]
impl AppParser for WhatsAppParser {
    fn app_kind(&self) -> AppKind {
        AppKind::WhatsApp
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let config = TraversalConfig::new().deadline(deadline);
        let mut warnings = Vec::new();

        // Two-pass lookup: the first "table" role-description element is the
        // conversation list, the second is the open chat itself.
        let tables = traversal::find_elements(
            window.clone(),
            config.clone(),
            Matcher::has_description_equal_to("table"),
        )
        .await?;
        let Some(chat) = tables.get(1) else {
            warnings.push("no open chat pane found".to_string());
            return Ok(ParseResult { warnings, ..Default::default() });
        };

        let rows = traversal::find_elements(chat.clone(), config.clone(), Matcher::Always).await?;

        let reference = Local::now();
        let mut channel_name: Option<String> = None;
        let mut is_group = false;
        let mut messages = Vec::new();
        let mut participants = std::collections::BTreeSet::new();

        for row in &rows {
            let Some(description) = text_of(row).await? else { continue };
            let Some(parsed) = parse_description(&description, reference) else { continue };
            if let Some(name) = &parsed.conversation_name {
                if let Some(existing) = &channel_name {
                    if existing != name {
                        is_group = true;
                    }
                } else {
                    channel_name = Some(name.clone());
                }
            }
            let Some(timestamp) = parsed.timestamp else {
                warnings.push(format!("unparseable timestamp in row: {description}"));
                continue;
            };
            participants.insert(parsed.sender.clone());
            messages.push(MessageRecord {
                sender: parsed.sender,
                content: parsed.content,
                timestamp,
                message_type: MessageType::Text,
                metadata: MessageMetadata::default(),
            });
        }

        let channel_name = channel_name.unwrap_or_else(|| "unknown-chat".to_string());
        let channel_type = if is_group { ChannelType::GroupChat } else { ChannelType::DirectMessage };

        if messages.is_empty() {
            return Ok(ParseResult { warnings, ..Default::default() });
        }

        let conversation = ConversationRecord {
            app: AppKind::WhatsApp,
            channel_type,
            channel_name,
            participants: participants.into_iter().collect(),
            messages,
        };

        Ok(ParseResult {
            conversations: vec![conversation],
            warnings,
            ..Default::default()
        })
    }
}
