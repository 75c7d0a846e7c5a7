// src/parsers/messages.rs
// Apple Messages: bubbles carry no explicit sender attribute at all —
// alignment is the only signal (`AXSubrole == "AXChatBubble"`, with the
// host OS exposing the sent/received distinction as the bubble's
// description prefix, e.g. "sent" vs. "Alice,"). Group chats repeat the
// sender name as part of the bubble description.

use async_trait::async_trait;

use crate::accessibility::ElementHandle;
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::bubble::{parse_bubble_conversation, BubbleSelectors};
use super::common::text_of;
use super::types::{AppKind, AppParser, ChannelType, ParseResult};

pub struct MessagesParser;

fn selectors() -> BubbleSelectors {
    BubbleSelectors {
        bubble: Matcher::has_subrole("AXChatBubble"),
        outgoing: Matcher::has_attribute_substring("AXLabel", "sent"),
        sender: Matcher::has_attribute_equal_to("data-qa", "bubble-sender"),
        content: Matcher::has_role("AXStaticText"),
        timestamp: Matcher::has_attribute_equal_to("data-qa", "bubble-timestamp"),
        reaction: Matcher::has_attribute_equal_to("data-qa", "tapback"),
    }
}

#[async_trait]
impl AppParser for MessagesParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Messages
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let config = TraversalConfig::new().deadline(deadline);
        let header = traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "conversation-title"),
        )
        .await?;
        let channel_name = match header {
            Some(el) => text_of(&el).await?.unwrap_or_else(|| "unknown-conversation".to_string()),
            None => "unknown-conversation".to_string(),
        };
        let channel_type = if channel_name.contains(',') {
            ChannelType::GroupChat
        } else {
            ChannelType::DirectMessage
        };

        parse_bubble_conversation(
            window,
            &selectors(),
            AppKind::Messages,
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
        let sent_bubble = MockElement::leaf()
            .subrole("AXChatBubble")
            .attribute("AXLabel", "sent")
            .child(MockElement::leaf().role("AXStaticText").value("on my way").build())
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "bubble-timestamp")
                    .value("2:41 PM")
                    .build(),
            )
            .build();
        let window = MockElement::leaf()
            .child(
                MockElement::leaf()
                    .attribute("data-qa", "conversation-title")
                    .value("Jordan")
                    .build(),
            )
            .child(sent_bubble)
            .build();

        let result = MessagesParser.parse(&window, Deadline::never()).await.unwrap();
        let conv = &result.conversations[0];
        assert_eq!(conv.channel_type, ChannelType::DirectMessage);
        assert_eq!(conv.messages[0].sender, "me");
        assert_eq!(conv.messages[0].content, "on my way");
    }
}
