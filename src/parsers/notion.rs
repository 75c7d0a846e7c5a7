// src/parsers/notion.rs
// Notion page: title block plus a list of `data-block-id` content blocks.

use async_trait::async_trait;

use crate::accessibility::ElementHandle;
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;

use super::document::{parse_document, DocumentSelectors};
use super::types::{AppKind, AppParser, ChannelType, ParseResult};

pub struct NotionParser;

#[async_trait]
impl AppParser for NotionParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Notion
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let selectors = DocumentSelectors {
            title: Matcher::has_attribute_equal_to("data-qa", "page-title"),
            body_block: Matcher::has_attribute_substring("data-block-id", ""),
            author: Some(Matcher::has_attribute_equal_to("data-qa", "page-last-edited-by")),
            modified_time: Some(Matcher::has_attribute_equal_to("data-qa", "page-last-edited-time")),
        };
        parse_document(window, &selectors, AppKind::Notion, ChannelType::Page, "unknown-editor", deadline).await
    }
}
