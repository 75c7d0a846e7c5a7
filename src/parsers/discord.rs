// src/parsers/discord.rs
// Discord: a flat list of message rows, grouped visually by author — the
// first row in a run of consecutive messages from the same author carries
// the sender name and avatar, later rows in the run omit them, much like
// Slack but without Slack's separate sticky date divider (Discord repeats
// a short inline date label instead, attached to the message itself).

use async_trait::async_trait;

use crate::accessibility::{Element, ElementHandle};
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::common::{parse_reaction_label, resolve_timestamp, text_of};
use super::types::{
    AppKind, AppParser, ChannelType, ConversationRecord, MessageMetadata, MessageRecord,
    MessageType, ParseResult, Reaction,
};

pub struct DiscordParser;

#[async_trait]
impl AppParser for DiscordParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Discord
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let mut warnings = Vec::new();
        let config = TraversalConfig::new().deadline(deadline);

        let channel_el = traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("aria-label", "channel-name-label"),
        )
        .await?;
        let channel_name = match &channel_el {
            Some(el) => text_of(el).await?.unwrap_or_else(|| "unknown-channel".to_string()),
            None => "unknown-channel".to_string(),
        };
        let channel_type = if channel_name.starts_with('#') {
            ChannelType::Channel
        } else {
            ChannelType::DirectMessage
        };

        let rows = traversal::find_elements(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-list-item-id", "chat-messages"),
        )
        .await?;

        let mut messages = Vec::new();
        let mut participants = std::collections::BTreeSet::new();
        let mut last_sender: Option<String> = None;

        for row in rows {
            if deadline.has_passed() {
                warnings.push("deadline exceeded before channel fully parsed".to_string());
                break;
            }

            let sender = match traversal::find_element(
                row.clone(),
                config.clone(),
                Matcher::has_attribute_equal_to("data-qa", "message-username"),
            )
            .await?
            {
                Some(el) => text_of(&el).await?,
                None => None,
            }
            .or_else(|| last_sender.clone());
            let Some(sender) = sender else {
                warnings.push("message row with no sender and no prior sender in run".to_string());
                continue;
            };

            let content = match traversal::find_element(
                row.clone(),
                config.clone(),
                Matcher::has_attribute_equal_to("data-qa", "message-content"),
            )
            .await?
            {
                Some(el) => text_of(&el).await?,
                None => None,
            };
            let Some(content) = content else {
                warnings.push(format!("message row from {sender} with no content"));
                continue;
            };

            let timestamp = match traversal::find_element(
                row.clone(),
                config.clone(),
                Matcher::has_attribute_equal_to("data-qa", "message-timestamp"),
            )
            .await?
            {
                Some(el) => text_of(&el).await?.as_deref().and_then(resolve_timestamp),
                None => None,
            };
            let Some(timestamp) = timestamp else {
                warnings.push(format!("unparsed timestamp for message from {sender}"));
                continue;
            };

            let reaction_pills = traversal::find_elements(
                row.clone(),
                config.clone(),
                Matcher::has_attribute_equal_to("data-qa", "reaction-pill"),
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

            last_sender = Some(sender.clone());
            participants.insert(sender.clone());
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

        let conversation = ConversationRecord {
            app: AppKind::Discord,
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
