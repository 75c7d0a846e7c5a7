// src/parsers/types.rs
// Shared parser output types (C6) — one shape every per-app parser produces,
// regardless of how different their accessibility trees are.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::accessibility::ElementHandle;
use crate::deadline::Deadline;
use crate::error::HarvesterError;

/// Every application this harvester knows how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum AppKind {
    Slack,
    WhatsApp,
    Discord,
    Messenger,
    Signal,
    Messages,
    Mail,
    Teams,
    Outlook,
    Notion,
    Obsidian,
    Calendar,
    Chrome,
    Zoom,
}

/// What kind of container a `ConversationRecord` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    DirectMessage,
    GroupChat,
    Channel,
    Thread,
    Email,
    Document,
    Event,
    Meeting,
    Page,
}

/// What a single message row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Text,
    Reaction,
    SystemNotice,
    Attachment,
    Call,
}

/// A single emoji/tapback reaction on a message, with its reactor list
/// where the app's accessibility tree exposes one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
    pub reactors: Vec<String>,
}

/// Everything about a message beyond its sender/content/timestamp: the
/// fields that vary most by app and that the dedup classifier (C7) needs
/// to tell NEW from UPDATED from REACTIONS_UPDATED.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub thread_id: Option<String>,
    pub reply_count: Option<u32>,
    pub reactions: Vec<Reaction>,
    pub edited: bool,
    pub attachments: Vec<String>,
}

/// One parsed message, ready for dedup + ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
    pub message_type: MessageType,
    pub metadata: MessageMetadata,
}

/// A parsed window's worth of conversation: one channel/thread/document
/// and the messages visible in it at parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub app: AppKind,
    pub channel_type: ChannelType,
    pub channel_name: String,
    pub participants: Vec<String>,
    pub messages: Vec<MessageRecord>,
}

/// A calendar entry parsed off an Outlook/Teams calendar cell or a
/// Calendar event pane: title, resolved start (and end, where the
/// source renders one), location and organizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub title: String,
    pub start: DateTime<Local>,
    pub end: Option<DateTime<Local>>,
    pub location: String,
    pub organizer: String,
}

/// A Chrome `web-area`'s identity and flattened text: the one case where
/// a parser needs to surface a machine-readable `url` alongside the
/// title/body a document parse already produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserFrame {
    pub url: String,
    pub title: String,
    pub text: String,
}

/// One video tile in an in-progress Zoom meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingParticipant {
    pub name: String,
    pub is_speaking: bool,
}

/// A snapshot of an in-progress meeting window: who's on the call and
/// who's currently unmuted, at the instant the window was parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSnapshot {
    pub topic: String,
    pub participants: Vec<MeetingParticipant>,
}

/// The output of a single parser invocation: a tagged union carrying any
/// of a window's conversations, calendar events, a browser frame or a
/// meeting snapshot, plus non-fatal warnings about elements the parser
/// could not make sense of. Most parsers populate only `conversations`;
/// Outlook/Teams also populate `calendar_events`, Chrome populates
/// `browser_frame` alongside its document conversation, and Zoom
/// populates `meeting` instead of any conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    pub conversations: Vec<ConversationRecord>,
    pub calendar_events: Vec<CalendarEvent>,
    pub browser_frame: Option<BrowserFrame>,
    pub meeting: Option<MeetingSnapshot>,
    pub warnings: Vec<String>,
}

impl ParseResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|c| c.messages.len()).sum()
    }
}

/// One parser implementation per supported application (C6). Parsing
/// never panics on malformed input — an unrecognized subtree becomes a
/// warning, not an error, since a single app window misrendering should
/// not abort an entire ingestion pass.
#[async_trait]
pub trait AppParser: Send + Sync {
    fn app_kind(&self) -> AppKind;

    async fn parse(
        &self,
        window: &ElementHandle,
        deadline: Deadline,
    ) -> Result<ParseResult, HarvesterError>;
}
