// src/matcher/collector.rs
// Mutable accumulators fed by a traversal as elements match a rule. Each
// collector is owned by a single traversal invocation and is not reused
// across calls.

use async_trait::async_trait;

use crate::accessibility::ElementHandle;
use crate::error::HarvesterError;

/// Something that can receive matched elements during a traversal.
#[async_trait]
pub trait Collector: Send {
    async fn add(&mut self, element: &ElementHandle) -> Result<(), HarvesterError>;
}

/// Collects the matched elements themselves.
#[derive(Default)]
pub struct ElementCollector {
    items: Vec<ElementHandle>,
}

impl ElementCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ElementHandle] {
        &self.items
    }

    pub fn first(&self) -> Option<&ElementHandle> {
        self.items.first()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn into_items(self) -> Vec<ElementHandle> {
        self.items
    }
}

#[async_trait]
impl Collector for ElementCollector {
    async fn add(&mut self, element: &ElementHandle) -> Result<(), HarvesterError> {
        self.items.push(element.clone());
        Ok(())
    }
}

/// Collects an element's trimmed, non-empty `value` text.
#[derive(Default)]
pub struct TextCollector {
    items: Vec<String>,
}

impl TextCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn first(&self) -> Option<&String> {
        self.items.first()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn join(&self, separator: &str) -> String {
        self.items.join(separator)
    }
}

#[async_trait]
impl Collector for TextCollector {
    async fn add(&mut self, element: &ElementHandle) -> Result<(), HarvesterError> {
        if let Some(value) = element.value().await? {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                self.items.push(trimmed.to_string());
            }
        }
        Ok(())
    }
}

/// Collects `value`, falling back to `description` when value is absent or
/// blank — the common pattern for UI elements that only expose their text
/// via a11y description (e.g. icon-only buttons, reaction pills).
#[derive(Default)]
pub struct ValueOrDescriptionCollector {
    items: Vec<String>,
}

impl ValueOrDescriptionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn first(&self) -> Option<&String> {
        self.items.first()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn join(&self, separator: &str) -> String {
        self.items.join(separator)
    }
}

#[async_trait]
impl Collector for ValueOrDescriptionCollector {
    async fn add(&mut self, element: &ElementHandle) -> Result<(), HarvesterError> {
        let value = element.value().await?.filter(|v| !v.trim().is_empty());
        let chosen = match value {
            Some(v) => Some(v),
            None => element.description().await?.filter(|d| !d.trim().is_empty()),
        };
        if let Some(text) = chosen {
            self.items.push(text.trim().to_string());
        }
        Ok(())
    }
}

/// Collects the value of a single named attribute from every matched
/// element that actually carries it.
pub struct AttributeCollector {
    attribute: String,
    items: Vec<String>,
}

impl AttributeCollector {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn first(&self) -> Option<&String> {
        self.items.first()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl Collector for AttributeCollector {
    async fn add(&mut self, element: &ElementHandle) -> Result<(), HarvesterError> {
        if let Some(value) = element.attribute(&self.attribute).await? {
            self.items.push(value);
        }
        Ok(())
    }
}

/// Sets a flag the first time any element is added; used for "did this
/// rule ever fire" checks (e.g. "is this thread pane visible at all").
#[derive(Default)]
pub struct FlagCollector {
    set: bool,
    count: usize,
}

impl FlagCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[async_trait]
impl Collector for FlagCollector {
    async fn add(&mut self, _element: &ElementHandle) -> Result<(), HarvesterError> {
        self.set = true;
        self.count += 1;
        Ok(())
    }
}
