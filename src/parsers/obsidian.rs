// src/parsers/obsidian.rs
// Obsidian note: a single markdown-rendered pane; paragraphs/headings are
// each their own accessibility element with role `AXStaticText`.

use async_trait::async_trait;

use crate::accessibility::ElementHandle;
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;

use super::document::{parse_document, DocumentSelectors};
use super::types::{AppKind, AppParser, ChannelType, ParseResult};

pub struct ObsidianParser;

#[async_trait]
impl AppParser for ObsidianParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Obsidian
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let selectors = DocumentSelectors {
            title: Matcher::has_attribute_equal_to("data-qa", "note-title"),
            body_block: Matcher::has_role("AXStaticText"),
            author: None,
            modified_time: Some(Matcher::has_attribute_equal_to("data-qa", "note-modified-time")),
        };
        parse_document(window, &selectors, AppKind::Obsidian, ChannelType::Document, "local-vault", deadline).await
    }
}
