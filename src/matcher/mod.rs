//! Matcher/rule/collector DSL (C4).
//!
//! Matchers are pure, stateless, tagged-variant predicates over an
//! [`Element`](crate::accessibility::Element) — tagged variants rather than
//! dynamic dispatch, per the design notes, so the common cases (role,
//! class, attribute equality) need no boxing. Collectors are the mutable
//! counterpart: small accumulators keyed by purpose.

mod collector;
mod rule;

pub use collector::{
    AttributeCollector, Collector, ElementCollector, FlagCollector, TextCollector,
    ValueOrDescriptionCollector,
};
pub use rule::{AttributeMapRule, Rule, RuleAction};

use std::future::Future;
use std::pin::Pin;

use crate::accessibility::{ChildRelation, Element, ElementHandle};
use crate::error::HarvesterError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How an attribute value should be compared to match.
#[derive(Debug, Clone)]
pub enum AttributeTest {
    EqualTo(String),
    Substring(String),
    ContainsAny(Vec<String>),
}

impl AttributeTest {
    fn matches(&self, value: &str) -> bool {
        match self {
            AttributeTest::EqualTo(expected) => value == expected,
            AttributeTest::Substring(needle) => value.contains(needle.as_str()),
            AttributeTest::ContainsAny(needles) => needles.iter().any(|n| value.contains(n.as_str())),
        }
    }
}

/// A pure, composable predicate over an accessibility element.
#[derive(Debug, Clone)]
pub enum Matcher {
    Always,
    HasRole(String),
    HasSubrole(String),
    HasAttribute(String, AttributeTest),
    /// Tests the element's accessibility *description* (its role
    /// description in platform terms) rather than a DOM attribute — the
    /// signal several per-app parsers pack a whole grammar into (e.g.
    /// WhatsApp's "table" role description, Zoom's "Video render" tiles).
    HasDescription(AttributeTest),
    HasClass(String),
    HasClassContaining(String),
    HasChild(Box<Matcher>),
    /// `maxDepth` bounds how far the descendant search may recurse.
    HasDescendant(Box<Matcher>, usize),
    Not(Box<Matcher>),
    All(Vec<Matcher>),
    Any(Vec<Matcher>),
}

impl Matcher {
    pub fn has_role(role: impl Into<String>) -> Self {
        Matcher::HasRole(role.into())
    }

    pub fn has_subrole(subrole: impl Into<String>) -> Self {
        Matcher::HasSubrole(subrole.into())
    }

    pub fn has_attribute_equal_to(name: impl Into<String>, value: impl Into<String>) -> Self {
        Matcher::HasAttribute(name.into(), AttributeTest::EqualTo(value.into()))
    }

    pub fn has_attribute_substring(name: impl Into<String>, needle: impl Into<String>) -> Self {
        Matcher::HasAttribute(name.into(), AttributeTest::Substring(needle.into()))
    }

    pub fn has_description_equal_to(value: impl Into<String>) -> Self {
        Matcher::HasDescription(AttributeTest::EqualTo(value.into()))
    }

    pub fn has_description_substring(needle: impl Into<String>) -> Self {
        Matcher::HasDescription(AttributeTest::Substring(needle.into()))
    }

    pub fn has_attribute_containing_any(
        name: impl Into<String>,
        needles: Vec<String>,
    ) -> Self {
        Matcher::HasAttribute(name.into(), AttributeTest::ContainsAny(needles))
    }

    pub fn has_class(class: impl Into<String>) -> Self {
        Matcher::HasClass(class.into())
    }

    pub fn has_class_containing(needle: impl Into<String>) -> Self {
        Matcher::HasClassContaining(needle.into())
    }

    pub fn has_child(inner: Matcher) -> Self {
        Matcher::HasChild(Box::new(inner))
    }

    pub fn has_descendant(inner: Matcher, max_depth: usize) -> Self {
        Matcher::HasDescendant(Box::new(inner), max_depth)
    }

    pub fn not(inner: Matcher) -> Self {
        Matcher::Not(Box::new(inner))
    }

    pub fn all(matchers: Vec<Matcher>) -> Self {
        Matcher::All(matchers)
    }

    pub fn any(matchers: Vec<Matcher>) -> Self {
        Matcher::Any(matchers)
    }

    /// Evaluate this matcher against `element`.
    pub fn matches<'a>(&'a self, element: &'a ElementHandle) -> BoxFuture<'a, Result<bool, HarvesterError>> {
        Box::pin(async move {
            match self {
                Matcher::Always => Ok(true),
                Matcher::HasRole(role) => {
                    Ok(element.role().await?.as_deref() == Some(role.as_str()))
                }
                Matcher::HasSubrole(subrole) => {
                    Ok(element.subrole().await?.as_deref() == Some(subrole.as_str()))
                }
                Matcher::HasAttribute(name, test) => {
                    Ok(match element.attribute(name).await? {
                        Some(value) => test.matches(&value),
                        None => false,
                    })
                }
                Matcher::HasDescription(test) => {
                    Ok(match element.description().await? {
                        Some(value) => test.matches(&value),
                        None => false,
                    })
                }
                Matcher::HasClass(class) => {
                    Ok(element.dom_class_list().await?.iter().any(|c| c == class))
                }
                Matcher::HasClassContaining(needle) => Ok(element
                    .dom_class_list()
                    .await?
                    .iter()
                    .any(|c| c.contains(needle.as_str()))),
                Matcher::HasChild(inner) => {
                    for child in element.children(ChildRelation::Children).await? {
                        if inner.matches(&child).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Matcher::HasDescendant(inner, max_depth) => {
                    has_descendant(inner, element, *max_depth).await
                }
                Matcher::Not(inner) => Ok(!inner.matches(element).await?),
                Matcher::All(matchers) => {
                    for m in matchers {
                        if !m.matches(element).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Matcher::Any(matchers) => {
                    for m in matchers {
                        if m.matches(element).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        })
    }
}

fn has_descendant<'a>(
    inner: &'a Matcher,
    element: &'a ElementHandle,
    max_depth: usize,
) -> BoxFuture<'a, Result<bool, HarvesterError>> {
    Box::pin(async move {
        if max_depth == 0 {
            return Ok(false);
        }
        for child in element.children(ChildRelation::Children).await? {
            if inner.matches(&child).await? {
                return Ok(true);
            }
            if has_descendant(inner, &child, max_depth - 1).await? {
                return Ok(true);
            }
        }
        Ok(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::MockElement;

    #[tokio::test]
    async fn not_not_is_identity() {
        let el = MockElement::leaf().role("AXButton").build();
        let m = Matcher::has_role("AXButton");
        let double_not = Matcher::not(Matcher::not(m.clone()));
        assert_eq!(m.matches(&el).await.unwrap(), double_not.matches(&el).await.unwrap());
    }

    #[tokio::test]
    async fn all_of_empty_is_true() {
        let el = MockElement::leaf().build();
        assert!(Matcher::all(vec![]).matches(&el).await.unwrap());
    }

    #[tokio::test]
    async fn any_of_empty_is_false() {
        let el = MockElement::leaf().build();
        assert!(!Matcher::any(vec![]).matches(&el).await.unwrap());
    }

    #[tokio::test]
    async fn all_of_single_matches_any_of_single() {
        let el = MockElement::leaf().role("AXButton").build();
        let m = Matcher::has_role("AXButton");
        let all_result = Matcher::all(vec![m.clone()]).matches(&el).await.unwrap();
        let any_result = Matcher::any(vec![m.clone()]).matches(&el).await.unwrap();
        let direct_result = m.matches(&el).await.unwrap();
        assert_eq!(all_result, direct_result);
        assert_eq!(any_result, direct_result);
    }

    #[tokio::test]
    async fn has_description_matches_role_description() {
        let el = MockElement::leaf().description("Video render").build();
        assert!(Matcher::has_description_equal_to("Video render").matches(&el).await.unwrap());
        assert!(!Matcher::has_description_equal_to("table").matches(&el).await.unwrap());
    }

    #[tokio::test]
    async fn has_descendant_respects_max_depth() {
        let grandchild = MockElement::leaf().role("target").build();
        let child = MockElement::leaf().child(grandchild).build();
        let root = MockElement::leaf().child(child).build();

        let shallow = Matcher::has_descendant(Matcher::has_role("target"), 1);
        assert!(!shallow.matches(&root).await.unwrap());

        let deep = Matcher::has_descendant(Matcher::has_role("target"), 2);
        assert!(deep.matches(&root).await.unwrap());
    }
}
