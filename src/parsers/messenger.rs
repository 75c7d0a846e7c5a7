// src/parsers/messenger.rs
// Facebook Messenger (desktop web wrapper) renders a message as several
// independently-positioned text/emoji/image fragments rather than one
// bubble element, so rows are reconstructed by grouping fragments that
// share a Y-coordinate (1px tolerance) and reading which side of the
// messages-list frame the group hugs to tell sender from recipient.

use async_trait::async_trait;
use chrono::Local;
use regex::Regex;
use std::sync::LazyLock;

use crate::accessibility::{Element, ElementHandle};
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::common::{resolve_timestamp, text_of};
use super::types::{
    AppKind, AppParser, ChannelType, ConversationRecord, MessageMetadata, MessageRecord,
    MessageType, ParseResult,
};

pub struct MessengerParser;

const Y_TOLERANCE: f64 = 1.0;

/// The four frozen admin date-time patterns Messenger uses for its
/// conversation date dividers.
static ADMIN_DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)^\d{1,2}:\d{2} [AP]M$").unwrap(),
        Regex::new(r"(?i)^(MON|TUE|WED|THU|FRI|SAT|SUN) \d{1,2}:\d{2} [AP]M$").unwrap(),
        Regex::new(r"^\d{2}/\d{2}/\d{4}, \d{1,2}:\d{2} [AP]M$").unwrap(),
        Regex::new(r"(?i)^(JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEP|OCT|NOV|DEC) \d{2}, \d{1,2}:\d{2} [AP]M$").unwrap(),
    ]
});

fn is_admin_date(text: &str) -> bool {
    ADMIN_DATE_PATTERNS.iter().any(|re| re.is_match(text.trim()))
}

const FRAGMENT_KINDS: &[&str] = &[
    "text-message",
    "emoji-message",
    "image-message",
    "reply_context_message",
    "hotlike_message",
    "admin-message",
    "message-sender-name",
];

struct Fragment {
    element: ElementHandle,
    kind: String,
    x: f64,
    y: f64,
}

#[async_trait]
impl AppParser for MessengerParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Messenger
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let config = TraversalConfig::new().deadline(deadline);
        let mut warnings = Vec::new();

        let channel_name = match traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-testid", "thread-title"),
        )
        .await?
        {
            Some(el) => text_of(&el).await?.unwrap_or_else(|| "unknown-thread".to_string()),
            None => "unknown-thread".to_string(),
        };
        let is_group = traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-testid", "group-participant-list"),
        )
        .await?
        .is_some();
        let channel_type = if is_group { ChannelType::GroupChat } else { ChannelType::DirectMessage };

        let Some(frame) = traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-testid", "messages-list"),
        )
        .await?
        else {
            warnings.push("no messages-list frame found".to_string());
            return Ok(ParseResult { warnings, ..Default::default() });
        };
        let (Some((frame_x, _)), Some((frame_width, _))) = (frame.position().await?, frame.size().await?) else {
            warnings.push("messages-list frame has no geometry".to_string());
            return Ok(ParseResult { warnings, ..Default::default() });
        };
        let center_x = frame_x + frame_width / 2.0;

        let candidates = traversal::find_elements(frame.clone(), config.clone(), Matcher::Always).await?;
        let mut fragments = Vec::new();
        for el in &candidates {
            let Some(kind) = el.attribute("data-testid").await? else { continue };
            if !FRAGMENT_KINDS.contains(&kind.as_str()) {
                continue;
            }
            let Some((x, y)) = el.position().await? else { continue };
            fragments.push(Fragment { element: el.clone(), kind, x, y });
        }
        fragments.sort_by(|a, b| a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal));

        let mut groups: Vec<Vec<Fragment>> = Vec::new();
        for frag in fragments {
            match groups.last_mut() {
                Some(group) if (group[0].y - frag.y).abs() <= Y_TOLERANCE => group.push(frag),
                _ => groups.push(vec![frag]),
            }
        }

        let mut messages = Vec::new();
        let mut participants = std::collections::BTreeSet::new();
        let mut running_timestamp: Option<chrono::DateTime<Local>> = None;

        for group in &groups {
            if group.len() == 1 && group[0].kind == "admin-message" {
                if let Some(text) = text_of(&group[0].element).await? {
                    if is_admin_date(&text) {
                        if let Some(ts) = resolve_timestamp(&text) {
                            running_timestamp = Some(ts);
                        } else {
                            warnings.push(format!("admin date-time message unparseable: {text}"));
                        }
                        continue;
                    }
                }
            }

            let image_count = group.iter().filter(|f| f.kind == "image-message").count();
            let has_like = group.iter().any(|f| f.kind == "hotlike_message");
            let has_emoji = group.iter().any(|f| f.kind == "emoji-message");
            let has_text = group.iter().any(|f| f.kind == "text-message");

            let (content, message_type) = if image_count >= 2 {
                (format!("Images ({image_count})"), MessageType::Attachment)
            } else if image_count == 1 {
                let frag = group.iter().find(|f| f.kind == "image-message").unwrap();
                (
                    text_of(&frag.element).await?.unwrap_or_else(|| "Image".to_string()),
                    MessageType::Attachment,
                )
            } else if has_like {
                ("👍".to_string(), MessageType::Reaction)
            } else {
                let mut parts = Vec::new();
                for frag in group.iter().filter(|f| f.kind == "text-message" || f.kind == "emoji-message") {
                    if let Some(t) = text_of(&frag.element).await? {
                        parts.push(t);
                    }
                }
                let content = parts.join(" ");
                let message_type = if has_emoji && !has_text { MessageType::Reaction } else { MessageType::Text };
                (content, message_type)
            };
            if content.is_empty() {
                warnings.push("message group with no readable content".to_string());
                continue;
            }

            let reply_context = match group.iter().find(|f| f.kind == "reply_context_message") {
                Some(frag) => text_of(&frag.element).await?,
                None => None,
            };

            let avg_x: f64 = group.iter().map(|f| f.x).sum::<f64>() / group.len() as f64;
            let is_self = avg_x >= center_x;
            let sender = if is_self {
                "me".to_string()
            } else {
                match group.iter().find(|f| f.kind == "message-sender-name") {
                    Some(frag) => text_of(&frag.element).await?.unwrap_or_else(|| channel_name.clone()),
                    None => channel_name.clone(),
                }
            };
            participants.insert(sender.clone());

            let timestamp = match running_timestamp {
                Some(ts) => ts,
                None => {
                    warnings.push(format!("message with no preceding admin timestamp: {content}"));
                    continue;
                }
            };

            messages.push(MessageRecord {
                sender,
                content,
                timestamp,
                message_type,
                metadata: MessageMetadata {
                    thread_id: reply_context,
                    reply_count: None,
                    reactions: Vec::new(),
                    edited: false,
                    attachments: Vec::new(),
                },
            });
        }

        participants.insert("me".to_string());

        if messages.is_empty() {
            return Ok(ParseResult { warnings, ..Default::default() });
        }

        let conversation = ConversationRecord {
            app: AppKind::Messenger,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::MockElement;

    fn frame_with_children(children: Vec<ElementHandle>) -> ElementHandle {
        MockElement::leaf()
            .attribute("data-testid", "messages-list")
            .position((0.0, 0.0))
            .size((400.0, 600.0))
            .children(children)
            .build()
    }

    #[tokio::test]
    async fn groups_fragments_by_y_and_resolves_side() {
        let admin = MockElement::leaf()
            .attribute("data-testid", "admin-message")
            .value("3:02 PM")
            .position((0.0, 0.0))
            .build();
        let left_text = MockElement::leaf()
            .attribute("data-testid", "text-message")
            .value("hello there")
            .position((10.0, 50.0))
            .build();
        let right_text = MockElement::leaf()
            .attribute("data-testid", "text-message")
            .value("hi!")
            .position((350.0, 80.0))
            .build();
        let msgs_frame = frame_with_children(vec![admin, left_text, right_text]);
        let window = MockElement::leaf().child(msgs_frame).build();

        let result = MessengerParser.parse(&window, Deadline::never()).await.unwrap();
        let conv = &result.conversations[0];
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].content, "hello there");
        assert_ne!(conv.messages[0].sender, "me");
        assert_eq!(conv.messages[1].content, "hi!");
        assert_eq!(conv.messages[1].sender, "me");
    }

    #[tokio::test]
    async fn two_or_more_images_emit_synthetic_count_label() {
        let admin = MockElement::leaf()
            .attribute("data-testid", "admin-message")
            .value("3:02 PM")
            .position((0.0, 0.0))
            .build();
        let image_a = MockElement::leaf()
            .attribute("data-testid", "image-message")
            .position((350.0, 50.0))
            .build();
        let image_b = MockElement::leaf()
            .attribute("data-testid", "image-message")
            .position((360.0, 50.0))
            .build();
        let msgs_frame = frame_with_children(vec![admin, image_a, image_b]);
        let window = MockElement::leaf().child(msgs_frame).build();

        let result = MessengerParser.parse(&window, Deadline::never()).await.unwrap();
        let conv = &result.conversations[0];
        assert_eq!(conv.messages[0].content, "Images (2)");
        assert_eq!(conv.messages[0].message_type, MessageType::Attachment);
    }

    #[tokio::test]
    async fn hotlike_message_is_like_only() {
        let admin = MockElement::leaf()
            .attribute("data-testid", "admin-message")
            .value("3:02 PM")
            .position((0.0, 0.0))
            .build();
        let like = MockElement::leaf()
            .attribute("data-testid", "hotlike_message")
            .position((350.0, 50.0))
            .build();
        let msgs_frame = frame_with_children(vec![admin, like]);
        let window = MockElement::leaf().child(msgs_frame).build();

        let result = MessengerParser.parse(&window, Deadline::never()).await.unwrap();
        let conv = &result.conversations[0];
        assert_eq!(conv.messages[0].content, "👍");
        assert_eq!(conv.messages[0].message_type, MessageType::Reaction);
    }

    #[tokio::test]
    async fn reply_context_is_captured_as_thread_context() {
        let admin = MockElement::leaf()
            .attribute("data-testid", "admin-message")
            .value("3:02 PM")
            .position((0.0, 0.0))
            .build();
        let reply = MockElement::leaf()
            .attribute("data-testid", "reply_context_message")
            .value("original message")
            .position((350.0, 50.0))
            .build();
        let text = MockElement::leaf()
            .attribute("data-testid", "text-message")
            .value("replying now")
            .position((350.0, 50.0))
            .build();
        let msgs_frame = frame_with_children(vec![admin, reply, text]);
        let window = MockElement::leaf().child(msgs_frame).build();

        let result = MessengerParser.parse(&window, Deadline::never()).await.unwrap();
        let conv = &result.conversations[0];
        assert_eq!(conv.messages[0].content, "replying now");
        assert_eq!(conv.messages[0].metadata.thread_id.as_deref(), Some("original message"));
    }

    #[tokio::test]
    async fn admin_date_patterns_set_running_timestamp() {
        let admin_weekday = MockElement::leaf()
            .attribute("data-testid", "admin-message")
            .value("MON 2:41 PM")
            .position((0.0, 0.0))
            .build();
        let text = MockElement::leaf()
            .attribute("data-testid", "text-message")
            .value("hey")
            .position((350.0, 40.0))
            .build();
        let msgs_frame = frame_with_children(vec![admin_weekday, text]);
        let window = MockElement::leaf().child(msgs_frame).build();

        let result = MessengerParser.parse(&window, Deadline::never()).await.unwrap();
        assert_eq!(result.conversations[0].messages.len(), 1);
    }
}
