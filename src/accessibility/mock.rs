// src/accessibility/mock.rs
// JSON-backed mock element used for offline parser development and tests.
//
// Dump shape (field names chosen to read naturally in fixture JSON):
// {
//   "role": "AXGroup", "subrole": "...", "title": "...", "value": "...",
//   "description": "...", "id": "...", "classes": ["p-view_contents--primary"],
//   "attributes": { "name": "value", ... },
//   "children": [ { ... }, ... ],
//   "contents": [ { ... }, ... ],
//   "position": [x, y], "size": [w, h], "pid": 1234
// }

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::element::{ChildRelation, Element, ElementHandle};
use crate::error::HarvesterError;

#[derive(Debug, Deserialize)]
struct MockElementDump {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    subrole: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    attributes: std::collections::HashMap<String, String>,
    #[serde(default)]
    children: Vec<MockElementDump>,
    #[serde(default)]
    contents: Vec<MockElementDump>,
    #[serde(default)]
    position: Option<(f64, f64)>,
    #[serde(default)]
    size: Option<(f64, f64)>,
    #[serde(default)]
    pid: Option<i32>,
}

/// A mock accessibility element backed by a JSON dump.
///
/// Used for offline testing of parsers against fixture windows without a
/// live accessibility tree.
#[derive(Debug)]
pub struct MockElement {
    role: Option<String>,
    subrole: Option<String>,
    title: Option<String>,
    value: Option<String>,
    description: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: std::collections::HashMap<String, String>,
    children: Vec<ElementHandle>,
    contents: Vec<ElementHandle>,
    position: Option<(f64, f64)>,
    size: Option<(f64, f64)>,
    pid: Option<i32>,
}

impl MockElement {
    /// Parse a JSON dump (as produced offline from a real window) into a
    /// tree of mock elements.
    pub fn from_json(json: &serde_json::Value) -> Result<ElementHandle, HarvesterError> {
        let dump: MockElementDump = serde_json::from_value(json.clone())?;
        Ok(Self::from_dump(dump))
    }

    /// Parse a JSON string dump into a tree of mock elements.
    pub fn from_json_str(s: &str) -> Result<ElementHandle, HarvesterError> {
        let dump: MockElementDump = serde_json::from_str(s)?;
        Ok(Self::from_dump(dump))
    }

    fn from_dump(dump: MockElementDump) -> ElementHandle {
        let children = dump.children.into_iter().map(Self::from_dump).collect();
        let contents = dump.contents.into_iter().map(Self::from_dump).collect();
        Arc::new(Self {
            role: dump.role,
            subrole: dump.subrole,
            title: dump.title,
            value: dump.value,
            description: dump.description,
            id: dump.id,
            classes: dump.classes,
            attributes: dump.attributes,
            children,
            contents,
            position: dump.position,
            size: dump.size,
            pid: dump.pid,
        })
    }

    /// Construct a single leaf element directly (useful in unit tests).
    pub fn leaf() -> MockElementBuilder {
        MockElementBuilder::default()
    }
}

/// Builder for constructing `MockElement` trees in tests without JSON.
#[derive(Default)]
pub struct MockElementBuilder {
    role: Option<String>,
    subrole: Option<String>,
    title: Option<String>,
    value: Option<String>,
    description: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: std::collections::HashMap<String, String>,
    children: Vec<ElementHandle>,
    contents: Vec<ElementHandle>,
    position: Option<(f64, f64)>,
    size: Option<(f64, f64)>,
    pid: Option<i32>,
}

impl MockElementBuilder {
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
    pub fn subrole(mut self, subrole: impl Into<String>) -> Self {
        self.subrole = Some(subrole.into());
        self
    }
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
    pub fn child(mut self, child: ElementHandle) -> Self {
        self.children.push(child);
        self
    }
    pub fn children(mut self, children: Vec<ElementHandle>) -> Self {
        self.children = children;
        self
    }
    pub fn contents(mut self, contents: Vec<ElementHandle>) -> Self {
        self.contents = contents;
        self
    }
    pub fn pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }
    pub fn position(mut self, position: (f64, f64)) -> Self {
        self.position = Some(position);
        self
    }
    pub fn size(mut self, size: (f64, f64)) -> Self {
        self.size = Some(size);
        self
    }
    pub fn build(self) -> ElementHandle {
        Arc::new(MockElement {
            role: self.role,
            subrole: self.subrole,
            title: self.title,
            value: self.value,
            description: self.description,
            id: self.id,
            classes: self.classes,
            attributes: self.attributes,
            children: self.children,
            contents: self.contents,
            position: self.position,
            size: self.size,
            pid: self.pid,
        })
    }
}

#[async_trait]
impl Element for MockElement {
    async fn role(&self) -> Result<Option<String>, HarvesterError> {
        Ok(self.role.clone())
    }
    async fn subrole(&self) -> Result<Option<String>, HarvesterError> {
        Ok(self.subrole.clone())
    }
    async fn title(&self) -> Result<Option<String>, HarvesterError> {
        Ok(self.title.clone())
    }
    async fn value(&self) -> Result<Option<String>, HarvesterError> {
        Ok(self.value.clone())
    }
    async fn description(&self) -> Result<Option<String>, HarvesterError> {
        Ok(self.description.clone())
    }
    async fn dom_identifier(&self) -> Result<Option<String>, HarvesterError> {
        Ok(self.id.clone())
    }
    async fn dom_class_list(&self) -> Result<Vec<String>, HarvesterError> {
        Ok(self.classes.clone())
    }
    async fn attribute(&self, name: &str) -> Result<Option<String>, HarvesterError> {
        Ok(self.attributes.get(name).cloned())
    }
    async fn children(
        &self,
        relation: ChildRelation,
    ) -> Result<Vec<ElementHandle>, HarvesterError> {
        Ok(match relation {
            ChildRelation::Children => self.children.clone(),
            ChildRelation::Contents => self.contents.clone(),
        })
    }
    async fn position(&self) -> Result<Option<(f64, f64)>, HarvesterError> {
        Ok(self.position)
    }
    async fn size(&self) -> Result<Option<(f64, f64)>, HarvesterError> {
        Ok(self.size)
    }
    fn pid(&self) -> Option<i32> {
        self.pid
    }
}
