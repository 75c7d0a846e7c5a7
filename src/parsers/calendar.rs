// src/parsers/calendar.rs
// Calendar event detail pane: title, start time, organizer, attendee list
// and a free-text description. Modeled as a single-message conversation
// (like a document) but with the attendee list as participants and the
// organizer as sender, so the event shows up correctly in a
// participant-filtered search.

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

pub struct CalendarParser;

#[async_trait]
impl AppParser for CalendarParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Calendar
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let mut warnings = Vec::new();
        let config = TraversalConfig::new().deadline(deadline);

        let title = match traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "event-title"),
        )
        .await?
        {
            Some(el) => text_of(&el).await?.unwrap_or_else(|| "untitled-event".to_string()),
            None => "untitled-event".to_string(),
        };

        let organizer = match traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "event-organizer"),
        )
        .await?
        {
            Some(el) => text_of(&el).await?,
            None => None,
        }
        .unwrap_or_else(|| "unknown-organizer".to_string());

        let start_time = match traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "event-start-time"),
        )
        .await?
        {
            Some(el) => text_of(&el).await?.as_deref().and_then(resolve_timestamp),
            None => None,
        };
        let Some(start_time) = start_time else {
            warnings.push("event had no parseable start time".to_string());
            return Ok(ParseResult {
                conversations: vec![],
                warnings,
                ..Default::default()
            });
        };

        let description = match traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "event-description"),
        )
        .await?
        {
            Some(el) => text_of(&el).await?,
            None => None,
        }
        .unwrap_or_default();

        let attendee_els = traversal::find_elements(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "event-attendee"),
        )
        .await?;
        let mut participants = std::collections::BTreeSet::new();
        participants.insert(organizer.clone());
        for el in &attendee_els {
            if let Some(name) = text_of(el).await? {
                participants.insert(name);
            }
        }

        let conversation = ConversationRecord {
            app: AppKind::Calendar,
            channel_type: ChannelType::Event,
            channel_name: title,
            participants: participants.into_iter().collect(),
            messages: vec![MessageRecord {
                sender: organizer,
                content: description,
                timestamp: start_time,
                message_type: MessageType::SystemNotice,
                metadata: MessageMetadata::default(),
            }],
        };

        Ok(ParseResult {
            conversations: vec![conversation],
            warnings,
            ..Default::default()
        })
    }
}
