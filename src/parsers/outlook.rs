// src/parsers/outlook.rs
// Outlook packs each inbox row's whole summary into one accessibility
// description string, the same way WhatsApp does — an email list cell and
// a calendar cell are told apart by which of two fixed regexes their
// description matches rather than by any structural attribute.

use async_trait::async_trait;
use chrono::{Local, NaiveDate, TimeZone};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::accessibility::ElementHandle;
use crate::dates::{parse_app_timestamp, parse_bare_time};
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::common::text_of;
use super::types::{
    AppKind, AppParser, CalendarEvent, ChannelType, ConversationRecord, MessageMetadata,
    MessageRecord, MessageType, ParseResult,
};

pub struct OutlookParser;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^Sender:\s*(.*?),\s*Subject:\s*(.*?),\s*(\d{1,2}/\d{1,2}/\d{2,4}),\s*Message preview:\s*(.*)$")
        .unwrap()
});

/// Shared with Teams — both apps render a calendar cell the same way.
pub static CALENDAR_CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(.*?), ((?:\w+ \d{1,2}, \d{4} \d{1,2}:\d{2} (?:AM|PM)) to (\d{1,2}:\d{2} (?:AM|PM))), location: (.*?), organized by (.*?),.*$",
    )
    .unwrap()
});

fn parse_date_only(s: &str) -> Option<NaiveDate> {
    let mut parts = s.trim().split('/');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year_raw: i32 = parts.next()?.parse().ok()?;
    let year = if year_raw < 100 { 2000 + year_raw } else { year_raw };
    NaiveDate::from_ymd_opt(year, month, day)
}

struct ParsedEmail {
    sender: String,
    subject: String,
    timestamp: chrono::DateTime<Local>,
    preview: String,
}

fn parse_email_cell(description: &str) -> Option<ParsedEmail> {
    let caps = EMAIL_RE.captures(description)?;
    let sender = caps.get(1)?.as_str().trim().to_string();
    let subject = caps.get(2)?.as_str().trim().to_string();
    let date = parse_date_only(caps.get(3)?.as_str())?;
    let preview = caps.get(4)?.as_str().trim().to_string();
    let naive = date.and_hms_opt(0, 0, 0)?;
    let timestamp = match Local.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => return None,
    };
    Some(ParsedEmail { sender, subject, timestamp, preview })
}

/// Shared with Teams — both apps render a calendar cell in the same shape.
pub fn parse_calendar_cell(description: &str, reference: chrono::DateTime<Local>) -> Option<CalendarEvent> {
    let caps = CALENDAR_CELL_RE.captures(description)?;
    let title = caps.get(1)?.as_str().trim().to_string();
    let range = caps.get(2)?.as_str();
    let end_raw = caps.get(3)?.as_str().trim();
    let location = caps.get(4)?.as_str().trim().to_string();
    let organizer = caps.get(5)?.as_str().trim().to_string();

    let (start_raw, _) = range.split_once(" to ")?;
    let start = parse_app_timestamp(start_raw.trim(), reference)?;
    let end = parse_bare_time(end_raw).and_then(|time| {
        let naive = chrono::NaiveDateTime::new(start.date_naive(), time);
        match Local.from_local_datetime(&naive) {
            chrono::LocalResult::Single(dt) => Some(dt),
            chrono::LocalResult::Ambiguous(dt, _) => Some(dt),
            chrono::LocalResult::None => None,
        }
    });

    Some(CalendarEvent { title, start, end, location, organizer })
}

#[async_trait]
impl AppParser for OutlookParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Outlook
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let mut warnings = Vec::new();
        let config = TraversalConfig::new().deadline(deadline);
        let reference = Local::now();

        let cells = traversal::find_elements(window.clone(), config.clone(), Matcher::Always).await?;

        let mut by_subject: BTreeMap<String, Vec<MessageRecord>> = BTreeMap::new();
        let mut calendar_events = Vec::new();

        for cell in &cells {
            if deadline.has_passed() {
                warnings.push("deadline exceeded before window fully parsed".to_string());
                break;
            }
            let Some(description) = text_of(cell).await? else { continue };

            if let Some(event) = parse_calendar_cell(&description, reference) {
                calendar_events.push(event);
                continue;
            }
            if let Some(email) = parse_email_cell(&description) {
                by_subject.entry(email.subject.clone()).or_default().push(MessageRecord {
                    sender: email.sender,
                    content: email.preview,
                    timestamp: email.timestamp,
                    message_type: MessageType::Text,
                    metadata: MessageMetadata {
                        thread_id: Some(email.subject),
                        reply_count: None,
                        reactions: Vec::new(),
                        edited: false,
                        attachments: Vec::new(),
                    },
                });
            }
        }

        let conversations = by_subject
            .into_iter()
            .map(|(subject, messages)| {
                let participants: std::collections::BTreeSet<String> =
                    messages.iter().map(|m| m.sender.clone()).collect();
                ConversationRecord {
                    app: AppKind::Outlook,
                    channel_type: ChannelType::Email,
                    channel_name: subject,
                    participants: participants.into_iter().collect(),
                    messages,
                }
            })
            .collect::<Vec<_>>();

        if conversations.is_empty() && calendar_events.is_empty() {
            warnings.push("no email or calendar cells matched".to_string());
        }

        Ok(ParseResult { conversations, calendar_events, warnings, ..Default::default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::MockElement;
    use chrono::{Datelike, Timelike};

    #[tokio::test]
    async fn parses_email_cell_via_regex() {
        let cell = MockElement::leaf()
            .description(
                "Sender: ops@example.com, Subject: Maintenance Notice, 3/3/2023, Message preview: Maintenance window tonight.",
            )
            .build();
        let window = MockElement::leaf().child(cell).build();

        let result = OutlookParser.parse(&window, Deadline::never()).await.unwrap();
        assert_eq!(result.conversations.len(), 1);
        let conv = &result.conversations[0];
        assert_eq!(conv.channel_name, "Maintenance Notice");
        assert_eq!(conv.messages[0].sender, "ops@example.com");
        assert_eq!(conv.messages[0].content, "Maintenance window tonight.");
    }

    #[tokio::test]
    async fn parses_calendar_cell_via_regex() {
        let cell = MockElement::leaf()
            .description(
                "Design Review, March 3, 2023 2:00 PM to 3:00 PM, location: Room 4, organized by Priya, more detail here",
            )
            .build();
        let window = MockElement::leaf().child(cell).build();

        let result = OutlookParser.parse(&window, Deadline::never()).await.unwrap();
        assert!(result.conversations.is_empty());
        assert_eq!(result.calendar_events.len(), 1);
        let event = &result.calendar_events[0];
        assert_eq!(event.title, "Design Review");
        assert_eq!(event.location, "Room 4");
        assert_eq!(event.organizer, "Priya");
        assert_eq!((event.start.year(), event.start.month(), event.start.day()), (2023, 3, 3));
        assert_eq!(event.start.hour(), 14);
        let end = event.end.unwrap();
        assert_eq!(end.hour(), 15);
    }
}
