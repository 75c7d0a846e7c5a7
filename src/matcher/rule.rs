// src/matcher/rule.rs
// Rule = Matcher + what to do with an element that matches it.

use std::collections::HashMap;

use crate::accessibility::ElementHandle;
use crate::error::HarvesterError;

use super::{Collector, Matcher};

/// What happens to an element once its rule's matcher accepts it.
pub enum RuleAction<'a> {
    /// Hand the element to a collector.
    Collect(&'a mut dyn Collector),
    /// Run an arbitrary side effect (parser state update) against it.
    Effect(Box<dyn FnMut(&ElementHandle) + Send + 'a>),
}

/// A single `(matcher, action)` pair evaluated once per visited element by
/// the traversal engine's `traverse_with_rules`.
pub struct Rule<'a> {
    pub matcher: Matcher,
    pub action: RuleAction<'a>,
}

impl<'a> Rule<'a> {
    pub fn collecting(matcher: Matcher, collector: &'a mut dyn Collector) -> Self {
        Rule {
            matcher,
            action: RuleAction::Collect(collector),
        }
    }

    pub fn effect(matcher: Matcher, effect: impl FnMut(&ElementHandle) + Send + 'a) -> Self {
        Rule {
            matcher,
            action: RuleAction::Effect(Box::new(effect)),
        }
    }

    /// Run this rule's action against a matched element.
    pub async fn apply(&mut self, element: &ElementHandle) -> Result<(), HarvesterError> {
        match &mut self.action {
            RuleAction::Collect(collector) => collector.add(element).await,
            RuleAction::Effect(effect) => {
                effect(element);
                Ok(())
            }
        }
    }
}

/// Dispatches on the value of a single named attribute: whichever handler's
/// key equals the attribute's current value (if any) runs; otherwise the
/// default handler runs, if one is set. Used by parsers that branch on an
/// enum-like attribute (e.g. Slack's `data-qa` message-kind marker).
pub struct AttributeMapRule<'a> {
    attribute: String,
    handlers: HashMap<String, Box<dyn FnMut(&ElementHandle) + Send + 'a>>,
    default: Option<Box<dyn FnMut(&ElementHandle) + Send + 'a>>,
}

impl<'a> AttributeMapRule<'a> {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            handlers: HashMap::new(),
            default: None,
        }
    }

    pub fn on(mut self, value: impl Into<String>, handler: impl FnMut(&ElementHandle) + Send + 'a) -> Self {
        self.handlers.insert(value.into(), Box::new(handler));
        self
    }

    pub fn otherwise(mut self, handler: impl FnMut(&ElementHandle) + Send + 'a) -> Self {
        self.default = Some(Box::new(handler));
        self
    }

    /// Look up the element's attribute and dispatch to the matching
    /// handler (or the default, if any). Returns whether any handler ran.
    pub async fn apply(&mut self, element: &ElementHandle) -> Result<bool, HarvesterError> {
        let value = element.attribute(&self.attribute).await?;
        match value.as_deref().and_then(|v| self.handlers.get_mut(v)) {
            Some(handler) => {
                handler(element);
                Ok(true)
            }
            None => match &mut self.default {
                Some(handler) => {
                    handler(element);
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::MockElement;
    use crate::matcher::ElementCollector;

    #[tokio::test]
    async fn collecting_rule_forwards_to_collector() {
        let mut collector = ElementCollector::new();
        let el = MockElement::leaf().role("AXButton").build();
        {
            let mut rule = Rule::collecting(Matcher::has_role("AXButton"), &mut collector);
            rule.apply(&el).await.unwrap();
        }
        assert_eq!(collector.count(), 1);
    }

    #[tokio::test]
    async fn attribute_map_dispatches_by_value() {
        let mut seen = Vec::new();
        let el = MockElement::leaf().attribute("data-qa", "message").build();
        {
            let mut rule = AttributeMapRule::new("data-qa")
                .on("message", |_| seen.push("message"))
                .on("divider", |_| seen.push("divider"))
                .otherwise(|_| seen.push("other"));
            let ran = rule.apply(&el).await.unwrap();
            assert!(ran);
        }
        assert_eq!(seen, vec!["message"]);
    }

    #[tokio::test]
    async fn attribute_map_falls_back_to_default() {
        let mut seen = Vec::new();
        let el = MockElement::leaf().attribute("data-qa", "unknown-kind").build();
        {
            let mut rule = AttributeMapRule::new("data-qa")
                .on("message", |_| seen.push("message"))
                .otherwise(|_| seen.push("other"));
            rule.apply(&el).await.unwrap();
        }
        assert_eq!(seen, vec!["other"]);
    }
}
