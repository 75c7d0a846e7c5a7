// src/parsers/common.rs
// Helpers shared by several per-app parsers: text extraction, reaction-label
// parsing, and timestamp resolution. Kept here instead of duplicated per
// parser, the way the teacher's language parsers share a `default_parse`
// helper module.

use chrono::Local;
use regex::Regex;
use std::sync::LazyLock;

use crate::accessibility::ElementHandle;
use crate::dates::parse_app_timestamp;
use crate::error::HarvesterError;
use crate::parsers::types::Reaction;

/// `value`, falling back to `description`, trimmed and filtered to
/// non-blank — the single most common accessor pattern across every
/// parser in this module.
pub async fn text_of(element: &ElementHandle) -> Result<Option<String>, HarvesterError> {
    if let Some(value) = element.value().await? {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
    if let Some(description) = element.description().await? {
        let trimmed = description.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
    Ok(None)
}

/// Resolve a rendered timestamp string against "now"; returns `None`
/// silently (never a wrong date) when the string isn't recognized.
pub fn resolve_timestamp(raw: &str) -> Option<chrono::DateTime<Local>> {
    parse_app_timestamp(raw, Local::now())
}

static REACTION_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<emoji>\S+)\s*(?:reaction)?s?\s*[:\-]?\s*(?P<count>\d+)").unwrap());

/// Parse a reaction pill's accessibility label, e.g. `"👍 3"`,
/// `"thumbsup: 3 reactions"`, into a [`Reaction`]. Reactor names are not
/// recoverable from the label alone; `reactors` is populated separately
/// where a parser can enumerate them (e.g. via a hover tooltip element).
pub fn parse_reaction_label(label: &str) -> Option<Reaction> {
    let caps = REACTION_LABEL_RE.captures(label.trim())?;
    let emoji = caps.name("emoji")?.as_str().to_string();
    let count: u32 = caps.name("count")?.as_str().parse().ok()?;
    Some(Reaction {
        emoji,
        count,
        reactors: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_emoji_count_label() {
        let r = parse_reaction_label("👍 3").unwrap();
        assert_eq!(r.emoji, "👍");
        assert_eq!(r.count, 3);
    }

    #[test]
    fn parses_named_reaction_label() {
        let r = parse_reaction_label("thumbsup: 3 reactions").unwrap();
        assert_eq!(r.emoji, "thumbsup:");
        assert_eq!(r.count, 3);
    }

    #[test]
    fn rejects_label_without_count() {
        assert!(parse_reaction_label("no count here").is_none());
    }
}
