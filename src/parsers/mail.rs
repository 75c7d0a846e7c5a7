// src/parsers/mail.rs
// Apple Mail: a reading-pane window showing one thread, rendered as a list
// of collapsed/expanded message cards, each with a from/date header and a
// body. Unlike chat apps there is no "sender omitted on repeat" collapsing
// — every card fully identifies its sender.

use async_trait::async_trait;

use crate::accessibility::ElementHandle;
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::common::{resolve_timestamp, text_of};
use super::types::{
    AppKind, AppParser, ChannelType, ConversationRecord, MessageMetadata, MessageRecord,
    MessageType, ParseResult,
};

pub struct MailParser;

#[async_trait]
impl AppParser for MailParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Mail
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let mut warnings = Vec::new();
        let config = TraversalConfig::new().deadline(deadline);

        let subject = match traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "thread-subject"),
        )
        .await?
        {
            Some(el) => text_of(&el).await?.unwrap_or_else(|| "(no subject)".to_string()),
            None => "(no subject)".to_string(),
        };

        let cards = traversal::find_elements(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "message-card"),
        )
        .await?;

        let mut messages = Vec::new();
        let mut participants = std::collections::BTreeSet::new();

        for card in cards {
            if deadline.has_passed() {
                warnings.push("deadline exceeded before thread fully parsed".to_string());
                break;
            }

            let sender = match traversal::find_element(
                card.clone(),
                config.clone(),
                Matcher::has_attribute_equal_to("data-qa", "message-from"),
            )
            .await?
            {
                Some(el) => text_of(&el).await?,
                None => None,
            };
            let Some(sender) = sender else {
                warnings.push("message card with no From header".to_string());
                continue;
            };

            let timestamp = match traversal::find_element(
                card.clone(),
                config.clone(),
                Matcher::has_attribute_equal_to("data-qa", "message-date"),
            )
            .await?
            {
                Some(el) => text_of(&el).await?.as_deref().and_then(resolve_timestamp),
                None => None,
            };
            let Some(timestamp) = timestamp else {
                warnings.push(format!("unparsed date for message from {sender}"));
                continue;
            };

            let body = match traversal::find_element(
                card.clone(),
                config.clone(),
                Matcher::has_attribute_equal_to("data-qa", "message-body"),
            )
            .await?
            {
                Some(el) => text_of(&el).await?,
                None => None,
            };
            let Some(body) = body else {
                warnings.push(format!("empty body for message from {sender}"));
                continue;
            };

            let attachments = traversal::find_elements(
                card.clone(),
                config.clone(),
                Matcher::has_attribute_equal_to("data-qa", "attachment-chip"),
            )
            .await?;
            let mut attachment_names = Vec::new();
            for chip in &attachments {
                if let Some(name) = text_of(chip).await? {
                    attachment_names.push(name);
                }
            }

            participants.insert(sender.clone());
            messages.push(MessageRecord {
                sender,
                content: body,
                timestamp,
                message_type: MessageType::Text,
                metadata: MessageMetadata {
                    thread_id: Some(subject.clone()),
                    reply_count: None,
                    reactions: Vec::new(),
                    edited: false,
                    attachments: attachment_names,
                },
            });
        }

        let conversation = ConversationRecord {
            app: AppKind::Mail,
            channel_type: ChannelType::Email,
            channel_name: subject,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::MockElement;

    #[tokio::test]
    async fn parses_thread_with_attachment() {
        let card = MockElement::leaf()
            .attribute("data-qa", "message-card")
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "message-from")
                    .value("finance@example.com")
                    .build(),
            )
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "message-date")
                    .value("Mar 3, 2023, at 9:00 AM")
                    .build(),
            )
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "message-body")
                    .value("Invoice attached.")
                    .build(),
            )
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "attachment-chip")
                    .value("invoice.pdf")
                    .build(),
            )
            .build();
        let window = MockElement::leaf()
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "thread-subject")
                    .value("Q1 Invoice")
                    .build(),
            )
            .child(card)
            .build();

        let result = MailParser.parse(&window, Deadline::never()).await.unwrap();
        let conv = &result.conversations[0];
        assert_eq!(conv.channel_name, "Q1 Invoice");
        assert_eq!(conv.messages[0].metadata.attachments, vec!["invoice.pdf".to_string()]);
    }
}
