// src/parsers/bubble.rs
// Shared "chat bubble" grammar: Messages and Signal both render a vertical
// list of left/right aligned bubbles rather than Slack's flat sender/
// timestamp rows. Rather than reimplement the same shape twice, each of
// those parsers configures this one with its own matchers.

use crate::accessibility::{Element, ElementHandle};
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::common::{parse_reaction_label, resolve_timestamp, text_of};
use super::types::{
    AppKind, ChannelType, ConversationRecord, MessageMetadata, MessageRecord, MessageType,
    ParseResult, Reaction,
};

/// The matchers a bubble-style parser needs to supply.
pub struct BubbleSelectors {
    /// Matches one bubble container (one message).
    pub bubble: Matcher,
    /// Matches a bubble that the local user sent (vs. received).
    pub outgoing: Matcher,
    /// Matches the sender-name element inside a bubble, when the app
    /// renders one (group chats typically do; 1:1 chats often don't).
    pub sender: Matcher,
    /// Matches the message text element inside a bubble.
    pub content: Matcher,
    /// Matches the timestamp element inside a bubble.
    pub timestamp: Matcher,
    /// Matches a reaction pill inside a bubble, if the app shows one.
    pub reaction: Matcher,
}

/// Parse one window as a single bubble-style conversation.
///
/// `self_label` is the display name used for outgoing bubbles;
/// `other_label` is the fallback sender for incoming bubbles that carry
/// no explicit sender element (the common case in a 1:1 chat, where the
/// counterpart's name is only shown once in the window header).
pub async fn parse_bubble_conversation(
    window: &ElementHandle,
    selectors: &BubbleSelectors,
    app: AppKind,
    channel_type: ChannelType,
    channel_name: String,
    self_label: &str,
    other_label: &str,
    deadline: Deadline,
) -> Result<ParseResult, HarvesterError> {
    let mut warnings = Vec::new();
    let config = TraversalConfig::new().deadline(deadline);

    let bubbles = traversal::find_elements(window.clone(), config.clone(), selectors.bubble.clone()).await?;

    let mut messages = Vec::new();
    let mut participants = std::collections::BTreeSet::new();

    for bubble in bubbles {
        if deadline.has_passed() {
            warnings.push("deadline exceeded before conversation fully parsed".to_string());
            break;
        }

        let content = match traversal::find_element(bubble.clone(), config.clone(), selectors.content.clone()).await? {
            Some(el) => text_of(&el).await?,
            None => None,
        };
        let Some(content) = content else {
            warnings.push("bubble with no readable content".to_string());
            continue;
        };

        let timestamp_raw = match traversal::find_element(bubble.clone(), config.clone(), selectors.timestamp.clone()).await? {
            Some(el) => text_of(&el).await?,
            None => None,
        };
        let Some(timestamp) = timestamp_raw.as_deref().and_then(resolve_timestamp) else {
            warnings.push(format!("unparsed or missing timestamp near message: {content}"));
            continue;
        };

        let is_outgoing = selectors.outgoing.matches(&bubble).await?;
        let explicit_sender = match traversal::find_element(bubble.clone(), config.clone(), selectors.sender.clone()).await? {
            Some(el) => text_of(&el).await?,
            None => None,
        };
        let sender = if is_outgoing {
            self_label.to_string()
        } else {
            explicit_sender.unwrap_or_else(|| other_label.to_string())
        };
        participants.insert(sender.clone());

        let reaction_pills = traversal::find_elements(bubble.clone(), config.clone(), selectors.reaction.clone()).await?;
        let mut reactions: Vec<Reaction> = Vec::new();
        for pill in &reaction_pills {
            if let Some(label) = pill.description().await? {
                if let Some(reaction) = parse_reaction_label(&label) {
                    reactions.push(reaction);
                }
            }
        }

        messages.push(MessageRecord {
            sender,
            content,
            timestamp,
            message_type: MessageType::Text,
            metadata: MessageMetadata {
                thread_id: None,
                reply_count: None,
                reactions,
                edited: false,
                attachments: Vec::new(),
            },
        });
    }

    participants.insert(self_label.to_string());

    let conversation = ConversationRecord {
        app,
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
