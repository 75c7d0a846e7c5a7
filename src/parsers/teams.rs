// src/parsers/teams.rs
// Microsoft Teams renders both chat rows and calendar rows through the
// same flat list once its accessibility subtree has been "unlocked" by a
// hit test at the window centre (spec.md §1's host accessibility
// collaborator's job, not this parser's — it only ever reads the tree it's
// given). Each row's description is matched against the message regex
// first, then the calendar-cell regex Outlook also uses; a row that
// matches neither is skipped.

use async_trait::async_trait;
use chrono::Local;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::accessibility::{Element, ElementHandle};
use crate::dates::parse_app_timestamp;
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::common::{parse_reaction_label, text_of};
use super::outlook::parse_calendar_cell;
use super::types::{
    AppKind, AppParser, ChannelType, ConversationRecord, MessageMetadata, MessageRecord,
    MessageType, ParseResult, Reaction,
};

pub struct TeamsParser;

static MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(.+?)(?: Sent)? (.+?) (\w+ \d{1,2}, \d{4} \d{1,2}:\d{2} (?:AM|PM))\.$").unwrap()
});

struct ParsedMessage {
    sender: String,
    content: String,
    timestamp: chrono::DateTime<Local>,
}

fn parse_message_row(description: &str, reference: chrono::DateTime<Local>) -> Option<ParsedMessage> {
    let caps = MESSAGE_RE.captures(description.trim())?;
    let sender = caps.get(1)?.as_str().trim().to_string();
    let content = caps.get(2)?.as_str().trim().to_string();
    let timestamp = parse_app_timestamp(caps.get(3)?.as_str(), reference)?;
    Some(ParsedMessage { sender, content, timestamp })
}

#[async_trait]
impl AppParser for TeamsParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Teams
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let mut warnings = Vec::new();
        let config = TraversalConfig::new().deadline(deadline);
        let reference = Local::now();

        let channel_name = match traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-tid", "chat-header-title"),
        )
        .await?
        {
            Some(el) => text_of(&el).await?.unwrap_or_else(|| "unknown-channel".to_string()),
            None => "unknown-channel".to_string(),
        };

        let rows = traversal::find_elements(window.clone(), config.clone(), Matcher::Always).await?;

        let mut messages = Vec::new();
        let mut participants = std::collections::BTreeSet::new();
        let mut calendar_events = Vec::new();

        for row in &rows {
            if deadline.has_passed() {
                warnings.push("deadline exceeded before window fully parsed".to_string());
                break;
            }
            let Some(description) = row.description().await? else { continue };

            if let Some(event) = parse_calendar_cell(&description, reference) {
                calendar_events.push(event);
                continue;
            }
            let Some(parsed) = parse_message_row(&description, reference) else { continue };

            let reaction_pills = traversal::find_elements(
                row.clone(),
                config.clone(),
                Matcher::has_attribute_equal_to("data-tid", "message-reaction"),
            )
            .await?;
            let mut reactions: Vec<Reaction> = Vec::new();
            for pill in &reaction_pills {
                if let Some(label) = pill.description().await? {
                    if let Some(reaction) = parse_reaction_label(&label) {
                        reactions.push(reaction);
                    }
                }
            }

            participants.insert(parsed.sender.clone());
            messages.push(MessageRecord {
                sender: parsed.sender,
                content: parsed.content,
                timestamp: parsed.timestamp,
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

        let channel_type = if participants.len() > 1 { ChannelType::GroupChat } else { ChannelType::Channel };

        let mut conversations = Vec::new();
        if !messages.is_empty() {
            conversations.push(ConversationRecord {
                app: AppKind::Teams,
                channel_type,
                channel_name,
                participants: participants.into_iter().collect(),
                messages,
            });
        }

        if conversations.is_empty() && calendar_events.is_empty() {
            warnings.push("no message or calendar rows matched".to_string());
        }

        Ok(ParseResult { conversations, calendar_events, warnings, ..Default::default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::MockElement;

    #[tokio::test]
    async fn parses_chat_message_row() {
        let row = MockElement::leaf()
            .description("Morgan sync at 3? March 3, 2023 2:41 PM.")
            .build();
        let window = MockElement::leaf()
            .child(
                MockElement::leaf()
                    .attribute("data-tid", "chat-header-title")
                    .value("Platform Team")
                    .build(),
            )
            .child(row)
            .build();

        let result = TeamsParser.parse(&window, Deadline::never()).await.unwrap();
        assert_eq!(result.calendar_events.len(), 0);
        let conv = &result.conversations[0];
        assert_eq!(conv.messages[0].sender, "Morgan");
        assert_eq!(conv.messages[0].content, "sync at 3?");
    }

    #[tokio::test]
    async fn branches_to_calendar_event() {
        let row = MockElement::leaf()
            .description("Design Review, March 3, 2023 2:00 PM to 3:00 PM, location: Room 4, organized by Priya, notes")
            .build();
        let window = MockElement::leaf().child(row).build();

        let result = TeamsParser.parse(&window, Deadline::never()).await.unwrap();
        assert!(result.conversations.is_empty());
        assert_eq!(result.calendar_events.len(), 1);
        assert_eq!(result.calendar_events[0].title, "Design Review");
    }
}
