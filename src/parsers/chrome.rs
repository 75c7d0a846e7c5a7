// src/parsers/chrome.rs
// Chrome reader-mode tab: locate the `web-area` (the page content, not the
// surrounding browser chrome), read its `url`, `title` and flattened
// static text into a `browser_frame`, and additionally treat it as a
// single-document conversation the same way Notion/Obsidian are, so the
// page's body text is still searchable as a message.

use async_trait::async_trait;

use crate::accessibility::{Element, ElementHandle};
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::Matcher;
use crate::traversal::{self, TraversalConfig};

use super::document::{parse_document, DocumentSelectors};
use super::types::{AppKind, AppParser, BrowserFrame, ChannelType, ParseResult};

pub struct ChromeParser;

#[async_trait]
impl AppParser for ChromeParser {
    fn app_kind(&self) -> AppKind {
        AppKind::Chrome
    }

    async fn parse(&self, window: &ElementHandle, deadline: Deadline) -> Result<ParseResult, HarvesterError> {
        let config = TraversalConfig::new().deadline(deadline);
        let selectors = DocumentSelectors {
            title: Matcher::has_role("AXWebArea"),
            body_block: Matcher::has_attribute_equal_to("data-qa", "reader-paragraph"),
            author: Some(Matcher::has_attribute_equal_to("data-qa", "reader-byline")),
            modified_time: None,
        };
        let mut result =
            parse_document(window, &selectors, AppKind::Chrome, ChannelType::Document, "unknown-author", deadline).await?;

        let web_area = traversal::find_element(window.clone(), config.clone(), Matcher::has_role("AXWebArea")).await?;
        if let Some(web_area) = web_area {
            let url = web_area.attribute("url").await?.unwrap_or_default();
            let title = web_area.title().await?.unwrap_or_else(|| "untitled".to_string());
            let text = result
                .conversations
                .first()
                .map(|c| c.messages.first().map(|m| m.content.clone()).unwrap_or_default())
                .unwrap_or_default();
            if !text.is_empty() {
                result.browser_frame = Some(BrowserFrame { url, title, text });
            } else {
                result.warnings.push("web-area had no text, browser frame not recorded".to_string());
            }
        } else {
            result.warnings.push("no web-area element found".to_string());
        }

        Ok(result)
    }
}
