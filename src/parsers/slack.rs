// src/parsers/slack.rs
// Slack parser — the exemplar per-app grammar (C6). Slack's message list is
// the hardest of the bunch: sender/timestamp are omitted on consecutive
// messages from the same author, dates live on separate sticky divider
// elements rather than on each message, and threads/reactions are nested
// subtrees rather than flat attributes.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};

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

pub struct SlackParser;

#[async_trait]
impl AppParser for SlackParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Slack
    }

    async fn parse(
        &self,
        window: &ElementHandle,
        deadline: Deadline,
    ) -> Result<ParseResult, HarvesterError> {
        let mut warnings = Vec::new();

        let config = TraversalConfig::new().deadline(deadline);
        let channel_name = traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "channel_name"),
        )
        .await?;
        let channel_name = match &channel_name {
            Some(el) => text_of(el).await?.unwrap_or_else(|| "unknown-channel".to_string()),
            None => {
                warnings.push("no channel_name element found".to_string());
                "unknown-channel".to_string()
            }
        };

        let channel_type = if channel_name.starts_with('#') {
            ChannelType::Channel
        } else {
            ChannelType::DirectMessage
        };

        // p-view_contents--primary: when its description is "Threads" this
        // window is showing the threads view, not a regular channel, and
        // has its own state machine (thread headers/footers splitting the
        // content-list into several conversations rather than one).
        let primary_view = traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::has_attribute_equal_to("data-qa", "view_contents_primary"),
        )
        .await?;
        let is_threads_view = match &primary_view {
            Some(el) => el.description().await?.as_deref() == Some("Threads"),
            None => false,
        };

        if is_threads_view {
            let (conversations, thread_warnings) =
                parse_threads_view(&window.clone(), &config, &channel_name, deadline).await?;
            warnings.extend(thread_warnings);
            return Ok(ParseResult {
                conversations,
                warnings,
                ..Default::default()
            });
        }

        let items = traversal::find_elements(
            window.clone(),
            config.clone(),
            Matcher::any(vec![
                Matcher::has_attribute_equal_to("data-qa", "virtual-list-item"),
                Matcher::has_attribute_equal_to("data-qa", "sticky_date_divider"),
            ]),
        )
        .await?;

        let (mut messages, mut participants, item_warnings) =
            parse_message_stream(&items, deadline).await?;
        warnings.extend(item_warnings);

        // Thread sidebar (§4.6 step 8): a second content-list under the
        // workspace wrapper whose description contains "Thread" is parsed
        // with the same message grammar and appended.
        if let Some(sidebar) = traversal::find_element(
            window.clone(),
            config.clone(),
            Matcher::all(vec![
                Matcher::has_subrole("content-list"),
                Matcher::has_attribute_substring("description", "Thread"),
            ]),
        )
        .await?
        {
            let sidebar_items = traversal::find_elements(
                sidebar,
                config.clone(),
                Matcher::has_attribute_equal_to("data-qa", "virtual-list-item"),
            )
            .await?;
            let (sidebar_messages, sidebar_participants, sidebar_warnings) =
                parse_message_stream(&sidebar_items, deadline).await?;
            messages.extend(sidebar_messages);
            participants.extend(sidebar_participants);
            warnings.extend(sidebar_warnings);
        }

        let conversation = ConversationRecord {
            app: AppKind::Slack,
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

/// Walk a flat content-list stream of `sticky_date_divider` and
/// `virtual-list-item` children, resolving message units in order and
/// carrying the date divider and sender carry-over rules (§4.6 step 7).
async fn parse_message_stream(
    items: &[ElementHandle],
    deadline: Deadline,
) -> Result<(Vec<MessageRecord>, std::collections::BTreeSet<String>, Vec<String>), HarvesterError> {
    let mut current_date: Option<NaiveDate> = None;
    let mut last_sender: Option<String> = None;
    let mut messages = Vec::new();
    let mut participants = std::collections::BTreeSet::new();
    let mut warnings = Vec::new();

    for item in items {
        if deadline.has_passed() {
            warnings.push("deadline exceeded before channel fully parsed".to_string());
            break;
        }

        let kind = item.attribute("data-qa").await?;
        match kind.as_deref() {
            Some("sticky_date_divider") => {
                if let Some(label) = text_of(item).await? {
                    if let Some(parsed) = resolve_timestamp(&label) {
                        current_date = Some(parsed.date_naive());
                    } else {
                        warnings.push(format!("unparsed date divider: {label}"));
                    }
                }
            }
            Some("virtual-list-item") => {
                match parse_message_item(item, current_date, last_sender.clone(), deadline).await? {
                    Some(message) => {
                        last_sender = Some(message.sender.clone());
                        participants.insert(message.sender.clone());
                        messages.push(message);
                    }
                    None => warnings.push("message item missing content or timestamp".to_string()),
                }
            }
            _ => {}
        }
    }

    Ok((messages, participants, warnings))
}

/// The threads state machine (§4.6 step 5): iterate the content-list's
/// children, switching between `SearchingForHeader` and
/// `ProcessingMessages` on `threads_view_heading`/`threads_view_footer`
/// markers, emitting one `ConversationRecord` per closed thread.
///
/// Per §9's Open Question resolution, the last-seen sender/timestamp
/// carry-over (`parse_message_stream`'s `last_sender`) is reset for each
/// thread rather than carried across the whole threads view — each
/// thread gets its own fresh `parse_message_stream` call.
async fn parse_threads_view(
    window: &ElementHandle,
    config: &TraversalConfig,
    base_channel_name: &str,
    deadline: Deadline,
) -> Result<(Vec<ConversationRecord>, Vec<String>), HarvesterError> {
    #[derive(PartialEq)]
    enum State {
        SearchingForHeader,
        ProcessingMessages,
    }

    let content_list = traversal::find_element(window.clone(), config.clone(), Matcher::has_subrole("content-list"))
        .await?
        .unwrap_or_else(|| window.clone());
    let children = content_list.children(crate::accessibility::ChildRelation::Children).await?;

    let mut warnings = Vec::new();
    let mut conversations = Vec::new();
    let mut state = State::SearchingForHeader;
    let mut current_channel: Option<String> = None;
    let mut current_participants: Option<String> = None;
    let mut pending: Vec<ElementHandle> = Vec::new();

    for child in children {
        if deadline.has_passed() {
            warnings.push("deadline exceeded before threads view fully parsed".to_string());
            break;
        }
        let id = child.dom_identifier().await?.unwrap_or_default();

        if id.starts_with("threads_view_heading") {
            let grandchildren = child.children(crate::accessibility::ChildRelation::Children).await?;
            let channel = match grandchildren.first() {
                Some(el) => text_of(el).await?.unwrap_or_default(),
                None => String::new(),
            };
            let participants = match grandchildren.get(1) {
                Some(el) => text_of(el).await?.unwrap_or_default(),
                None => String::new(),
            };
            current_channel = Some(channel);
            current_participants = Some(participants);
            pending.clear();
            state = State::ProcessingMessages;
        } else if id.starts_with("threads_view_footer") {
            if state == State::ProcessingMessages {
                let (messages, participant_set, item_warnings) = parse_message_stream(&pending, deadline).await?;
                warnings.extend(item_warnings);
                let channel_name = match (&current_channel, &current_participants) {
                    (Some(ch), Some(who)) if !who.is_empty() => {
                        format!("{base_channel_name}, {ch} with {who}")
                    }
                    (Some(ch), _) => format!("{base_channel_name}, {ch}"),
                    _ => base_channel_name.to_string(),
                };
                conversations.push(ConversationRecord {
                    app: AppKind::Slack,
                    channel_type: ChannelType::Thread,
                    channel_name,
                    participants: participant_set.into_iter().collect(),
                    messages,
                });
            }
            pending.clear();
            current_channel = None;
            current_participants = None;
            state = State::SearchingForHeader;
        } else if state == State::ProcessingMessages {
            pending.push(child);
        }
    }

    // End-of-input flushes if still mid-thread (§4.6 step 5).
    if state == State::ProcessingMessages && !pending.is_empty() {
        let (messages, participant_set, item_warnings) = parse_message_stream(&pending, deadline).await?;
        warnings.extend(item_warnings);
        let channel_name = match (&current_channel, &current_participants) {
            (Some(ch), Some(who)) if !who.is_empty() => format!("{base_channel_name}, {ch} with {who}"),
            (Some(ch), _) => format!("{base_channel_name}, {ch}"),
            _ => base_channel_name.to_string(),
        };
        conversations.push(ConversationRecord {
            app: AppKind::Slack,
            channel_type: ChannelType::Thread,
            channel_name,
            participants: participant_set.into_iter().collect(),
            messages,
        });
    }

    Ok((conversations, warnings))
}

/// Parse one `virtual-list-item` subtree into a message.
///
/// `current_date` supplies the day for a bare time-of-day timestamp (e.g.
/// "2:41 PM"); `fallback_sender` supplies the author for a message whose
/// sender name Slack collapsed because it follows another from the same
/// person.
async fn parse_message_item(
    item: &ElementHandle,
    current_date: Option<NaiveDate>,
    fallback_sender: Option<String>,
    deadline: Deadline,
) -> Result<Option<MessageRecord>, HarvesterError> {
    let config = TraversalConfig::new().deadline(deadline);

    let sender_el = traversal::find_element(
        item.clone(),
        config.clone(),
        Matcher::has_attribute_equal_to("data-qa", "message_sender"),
    )
    .await?;
    let sender = match sender_el {
        Some(el) => text_of(&el).await?,
        None => None,
    }
    .or(fallback_sender);
    let Some(sender) = sender else {
        return Ok(None);
    };

    let timestamp_el = traversal::find_element(
        item.clone(),
        config.clone(),
        Matcher::has_attribute_equal_to("data-qa", "message_timestamp"),
    )
    .await?;
    let Some(timestamp_el) = timestamp_el else {
        return Ok(None);
    };
    let Some(raw_timestamp) = timestamp_el.attribute("data-ts-label").await?.or(text_of(&timestamp_el).await?) else {
        return Ok(None);
    };
    let timestamp = match resolve_timestamp_with_date(&raw_timestamp, current_date) {
        Some(ts) => ts,
        None => return Ok(None),
    };

    let content_el = traversal::find_element(
        item.clone(),
        config.clone(),
        Matcher::has_attribute_equal_to("data-qa", "message_content"),
    )
    .await?;
    let content = match content_el {
        Some(el) => text_of(&el).await?,
        None => None,
    };
    let Some(content) = content else {
        return Ok(None);
    };

    let reaction_pills = traversal::find_elements(
        item.clone(),
        config.clone(),
        Matcher::has_attribute_equal_to("data-qa", "reaction_pill"),
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

    let thread_el = traversal::find_element(
        item.clone(),
        config.clone(),
        Matcher::has_attribute_equal_to("data-qa", "reply_count"),
    )
    .await?;
    let (thread_id, reply_count) = match thread_el {
        Some(el) => {
            let label = text_of(&el).await?;
            let reply_count = label
                .as_deref()
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.parse::<u32>().ok());
            (Some(format!("thread:{}", item.dom_identifier().await?.unwrap_or_default())), reply_count)
        }
        None => (None, None),
    };

    let edited = item_has_edited_marker(item, &config).await?;

    Ok(Some(MessageRecord {
        sender,
        content,
        timestamp,
        message_type: MessageType::Text,
        metadata: MessageMetadata {
            thread_id,
            reply_count,
            reactions,
            edited,
            attachments: Vec::new(),
        },
    }))
}

async fn item_has_edited_marker(
    item: &ElementHandle,
    config: &TraversalConfig,
) -> Result<bool, HarvesterError> {
    let found = traversal::find_element(
        item.clone(),
        config.clone(),
        Matcher::has_attribute_equal_to("data-qa", "edited_label"),
    )
    .await?;
    Ok(found.is_some())
}

fn resolve_timestamp_with_date(raw: &str, current_date: Option<NaiveDate>) -> Option<DateTime<Local>> {
    if let Some(parsed) = resolve_timestamp(raw) {
        return Some(parsed);
    }
    let date = current_date?;
    let time = crate::dates::parse_app_timestamp(raw, Local::now())?;
    Some(date.and_time(time.time()).and_local_timezone(Local).single()?)
}
