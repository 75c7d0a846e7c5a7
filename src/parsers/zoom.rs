// src/parsers/zoom.rs
// Zoom's accessibility tree exposes no chat transcript at all — what it
// does expose is a live snapshot of who is on the call. A meeting in
// progress is detected by a window whose title contains "Zoom Meeting";
// each participant tile's role description is literally "Video render",
// with "unmuted" appearing in the description marking who is speaking.

use async_trait::async_trait;

use crate::accessibility::{Element, ElementHandle};
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::common::text_of;
use super::types::{AppKind, AppParser, MeetingParticipant, MeetingSnapshot, ParseResult};

pub struct ZoomParser;

#[async_trait]
impl AppParser for ZoomParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Zoom
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let config = TraversalConfig::new().deadline(deadline);
        let mut warnings = Vec::new();

        let title = window.title().await?.unwrap_or_default();
        if !title.contains("Zoom Meeting") {
            warnings.push("no meeting-in-progress window found".to_string());
            return Ok(ParseResult { warnings, ..Default::default() });
        }
        let topic = title
            .replace("Zoom Meeting", "")
            .trim_matches(|c: char| c == '-' || c.is_whitespace())
            .to_string();
        let topic = if topic.is_empty() { "unknown-meeting".to_string() } else { topic };

        let tiles = traversal::find_elements(
            window.clone(),
            config.clone(),
            Matcher::has_description_equal_to("Video render"),
        )
        .await?;

        let mut participants = Vec::new();
        for tile in &tiles {
            let name = match text_of(tile).await? {
                Some(name) => name,
                None => {
                    warnings.push("participant tile with no readable name".to_string());
                    continue;
                }
            };
            let is_speaking = tile
                .description()
                .await?
                .map(|d| d.contains("unmuted"))
                .unwrap_or(false);
            participants.push(MeetingParticipant { name, is_speaking });
        }

        Ok(ParseResult {
            meeting: Some(MeetingSnapshot { topic, participants }),
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
    async fn detects_meeting_and_speaking_participant() {
        let dana = MockElement::leaf()
            .description("Video render, unmuted")
            .value("Dana")
            .build();
        let alex = MockElement::leaf().description("Video render").value("Alex").build();
        let window = MockElement::leaf()
            .title("Zoom Meeting - Q3 Planning")
            .child(dana)
            .child(alex)
            .build();

        let result = ZoomParser.parse(&window, Deadline::never()).await.unwrap();
        let meeting = result.meeting.unwrap();
        assert_eq!(meeting.topic, "Q3 Planning");
        assert!(result.conversations.is_empty());
        assert_eq!(meeting.participants.len(), 2);
        assert!(meeting.participants.iter().any(|p| p.name == "Dana" && p.is_speaking));
        assert!(meeting.participants.iter().any(|p| p.name == "Alex" && !p.is_speaking));
    }

    #[tokio::test]
    async fn window_without_zoom_meeting_title_yields_no_meeting() {
        let window = MockElement::leaf().title("Zoom - Chat").build();
        let result = ZoomParser.parse(&window, Deadline::never()).await.unwrap();
        assert!(result.meeting.is_none());
        assert!(!result.warnings.is_empty());
    }
}
