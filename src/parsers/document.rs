// src/parsers/document.rs
// Shared "single document" grammar: Notion pages, Obsidian notes and a
// Chrome reader-mode tab all render as one scrollable block of text rather
// than a list of discrete messages. Each becomes a `ConversationRecord`
// with exactly one synthetic message holding the full extracted text, so
// the rest of the pipeline (dedup, chunking, search) can treat documents
// uniformly with chat messages.

use chrono::Local;

use crate::accessibility::{Element, ElementHandle};
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::common::{resolve_timestamp, text_of};
use super::types::{
    AppKind, ChannelType, ConversationRecord, MessageMetadata, MessageRecord, MessageType,
    ParseResult,
};

pub struct DocumentSelectors {
    pub title: Matcher,
    pub body_block: Matcher,
    pub author: Option<Matcher>,
    pub modified_time: Option<Matcher>,
}

/// Extract one document window as a single-message conversation: the
/// title becomes the channel name, every matched body block's text is
/// joined with blank lines into the message content.
pub async fn parse_document(
    window: &ElementHandle,
    selectors: &DocumentSelectors,
    app: AppKind,
    channel_type: ChannelType,
    default_author: &str,
    deadline: Deadline,
) -> Result<ParseResult, HarvesterError> {
    let mut warnings = Vec::new();
    let config = TraversalConfig::new().deadline(deadline);

    let title = match traversal::find_element(window.clone(), config.clone(), selectors.title.clone()).await? {
        Some(el) => {
            let resolved = match el.title().await? {
                Some(t) if !t.trim().is_empty() => Some(t.trim().to_string()),
                _ => text_of(&el).await?,
            };
            resolved.unwrap_or_else(|| "untitled".to_string())
        }
        None => {
            warnings.push("no title element found".to_string());
            "untitled".to_string()
        }
    };

    let blocks = traversal::find_elements(window.clone(), config.clone(), selectors.body_block.clone()).await?;
    let mut parts = Vec::new();
    for block in blocks {
        if deadline.has_passed() {
            warnings.push("deadline exceeded before document fully read".to_string());
            break;
        }
        if let Some(text) = text_of(&block).await? {
            parts.push(text);
        }
    }
    let content = parts.join("\n\n");
    if content.is_empty() {
        warnings.push("document had no readable body blocks".to_string());
    }

    let author = match &selectors.author {
        Some(matcher) => match traversal::find_element(window.clone(), config.clone(), matcher.clone()).await? {
            Some(el) => text_of(&el).await?,
            None => None,
        },
        None => None,
    }
    .unwrap_or_else(|| default_author.to_string());

    let timestamp = match &selectors.modified_time {
        Some(matcher) => match traversal::find_element(window.clone(), config.clone(), matcher.clone()).await? {
            Some(el) => text_of(&el).await?.as_deref().and_then(resolve_timestamp),
            None => None,
        },
        None => None,
    }
    .unwrap_or_else(Local::now);

    let conversation = ConversationRecord {
        app,
        channel_type,
        channel_name: title,
        participants: vec![author.clone()],
        messages: vec![MessageRecord {
            sender: author,
            content,
            timestamp,
            message_type: MessageType::Text,
            metadata: MessageMetadata::default(),
        }],
    };

    Ok(ParseResult {
        conversations: vec![conversation],
        warnings,
        ..Default::default()
    })
}
