//! Per-app parsers (C6).
//!
//! One [`AppParser`] implementation per supported application, grounded on
//! the teacher's `LanguageParser` trait (one trait, one impl per
//! language, dispatched by a table keyed on an enum) — generalized here
//! from source-file languages to accessibility-tree grammars keyed by
//! [`AppKind`].

mod bubble;
mod calendar;
mod chrome;
mod common;
mod discord;
mod document;
mod mail;
mod messages;
mod messenger;
mod notion;
mod obsidian;
mod outlook;
mod signal;
mod slack;
mod teams;
mod types;
mod whatsapp;
mod zoom;

pub use types::{
    AppKind, AppParser, BrowserFrame, CalendarEvent, ChannelType, ConversationRecord,
    MeetingParticipant, MeetingSnapshot, MessageMetadata, MessageRecord, MessageType, ParseResult,
    Reaction,
};

use std::collections::HashMap;

use crate::accessibility::ElementHandle;
use crate::deadline::Deadline;
use crate::error::HarvesterError;

/// Table of every built-in parser, keyed by the app it handles.
///
/// Built fresh per caller rather than a lazily-initialized global: parsers
/// are stateless and cheap to construct, and a fresh table avoids any
/// shared mutable state across concurrent ingestion runs.
pub struct ParserRegistry {
    parsers: HashMap<AppKind, Box<dyn AppParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut parsers: HashMap<AppKind, Box<dyn AppParser>> = HashMap::new();
        parsers.insert(AppKind::Slack, Box::new(slack::SlackParser));
        parsers.insert(AppKind::WhatsApp, Box::new(whatsapp::WhatsAppParser));
        parsers.insert(AppKind::Messenger, Box::new(messenger::MessengerParser));
        parsers.insert(AppKind::Messages, Box::new(messages::MessagesParser));
        parsers.insert(AppKind::Signal, Box::new(signal::SignalParser));
        parsers.insert(AppKind::Mail, Box::new(mail::MailParser));
        parsers.insert(AppKind::Outlook, Box::new(outlook::OutlookParser));
        parsers.insert(AppKind::Discord, Box::new(discord::DiscordParser));
        parsers.insert(AppKind::Teams, Box::new(teams::TeamsParser));
        parsers.insert(AppKind::Notion, Box::new(notion::NotionParser));
        parsers.insert(AppKind::Obsidian, Box::new(obsidian::ObsidianParser));
        parsers.insert(AppKind::Calendar, Box::new(calendar::CalendarParser));
        parsers.insert(AppKind::Chrome, Box::new(chrome::ChromeParser));
        parsers.insert(AppKind::Zoom, Box::new(zoom::ZoomParser));
        Self { parsers }
    }
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app: AppKind) -> Option<&dyn AppParser> {
        self.parsers.get(&app).map(|boxed| boxed.as_ref())
    }

    /// Parse `window` with the registered parser for `app`.
    pub async fn parse(
        &self,
        app: AppKind,
        window: &ElementHandle,
        deadline: Deadline,
    ) -> Result<ParseResult, HarvesterError> {
        match self.get(app) {
            Some(parser) => parser.parse(window, deadline).await,
            None => Err(HarvesterError::Malformed(format!("no parser registered for {app}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_app_kind() {
        let registry = ParserRegistry::new();
        for app in [
            AppKind::Slack,
            AppKind::WhatsApp,
            AppKind::Discord,
            AppKind::Messenger,
            AppKind::Signal,
            AppKind::Messages,
            AppKind::Mail,
            AppKind::Teams,
            AppKind::Outlook,
            AppKind::Notion,
            AppKind::Obsidian,
            AppKind::Calendar,
            AppKind::Chrome,
            AppKind::Zoom,
        ] {
            assert!(registry.get(app).is_some(), "missing parser for {app}");
        }
    }
}
