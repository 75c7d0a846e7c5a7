// src/parsers/signal.rs
// Signal Desktop has no dedicated grammar in the original spec (an Open
// Question, resolved in DESIGN.md): its accessibility exposure is closest
// to Messages/Messenger's bubble-list-with-alignment shape, so it is
// implemented as a thin variant of that family rather than invented from
// scratch.

use async_trait::async_trait;

use crate::accessibility::ElementHandle;
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::bubble::{parse_bubble_conversation, BubbleSelectors};
use super::common::text_of;
use super::types::{AppKind, AppParser, ChannelType, ParseResult};

pub struct SignalParser;

fn selectors() -> BubbleSelectors {
    BubbleSelectors {
        bubble: Matcher::has_attribute_equal_to("data-qa", "signal-message-bubble"),
        outgoing: Matcher::has_class("outgoing"),
        sender: Matcher::has_attribute_equal_to("data-qa", "signal-message-author"),
        content: Matcher::has_attribute_equal_to("data-qa", "signal-message-text"),
        timestamp: Matcher::has_attribute_equal_to("data-qa", "signal-message-timestamp"),
        reaction: Matcher::has_attribute_equal_to("data-qa", "signal-message-reaction"),
    }
}

#[async_trait]
impl AppParser for SignalParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Signal
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let config = TraversalConfig::new().deadline(deadline);
        let header = traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "conversation-header-title"),
        )
        .await?;
        let channel_name = match header {
            Some(el) => text_of(&el).await?.unwrap_or_else(|| "unknown-conversation".to_string()),
            None => "unknown-conversation".to_string(),
        };
        let is_group = traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "group-member-count"),
        )
        .await?
        .is_some();
        let channel_type = if is_group { ChannelType::GroupChat } else { ChannelType::DirectMessage };

        parse_bubble_conversation(
            window,
            &selectors(),
            AppKind::Signal,
            channel_type,
            channel_name.clone(),
            "me",
            &channel_name,
            deadline,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::MockElement;

    #[tokio::test]
    async fn parses_direct_conversation() {
        let bubble = MockElement::leaf()
            .attribute("data-qa", "signal-message-bubble")
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "signal-message-text")
                    .value("disappearing in 1 week")
                    .build(),
            )
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "signal-message-timestamp")
                    .value("2:41 PM")
                    .build(),
            )
            .build();
        let window = MockElement::leaf()
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "conversation-header-title")
                    .value("Sam")
                    .build(),
            )
            .child(bubble)
            .build();

        let result = SignalParser.parse(&window, Deadline::never()).await.unwrap();
        let conv = &result.conversations[0];
        assert_eq!(conv.channel_type, ChannelType::DirectMessage);
        assert_eq!(conv.messages[0].sender, "Sam");
    }
}
