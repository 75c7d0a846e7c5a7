//! Traversal engine (C3).
//!
//! A deadline-bounded, depth-limited, cancellable depth-first pre-order
//! walk over an [`Element`](crate::accessibility::Element) tree. The walk
//! is pulled one element at a time through [`Traversal::next`] — no
//! subtree is read until the consumer asks for it, so an `excludeElement`
//! or `terminationCondition` match can prune or stop work the caller never
//! pays for. Grounded on the teacher's `FileWalker` chained-setter
//! builder, generalized from a filesystem walk to an accessibility-tree
//! walk.

use crate::accessibility::{ChildRelation, ElementHandle};
use crate::deadline::Deadline;
use crate::error::HarvesterError;
use crate::matcher::{Matcher, Rule};

/// Declarative configuration for a single traversal.
#[derive(Clone)]
pub struct TraversalConfig {
    exclude: Vec<Matcher>,
    skip_children: Vec<Matcher>,
    terminate_after: Vec<Matcher>,
    max_depth: usize,
    deadline: Deadline,
    relation: ChildRelation,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            skip_children: Vec::new(),
            terminate_after: Vec::new(),
            max_depth: usize::MAX,
            deadline: Deadline::never(),
            relation: ChildRelation::Children,
        }
    }
}

impl TraversalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elements matching this are skipped entirely, along with their
    /// subtree — neither yielded nor descended into.
    pub fn exclude_element(mut self, matcher: Matcher) -> Self {
        self.exclude.push(matcher);
        self
    }

    /// Elements matching this are yielded, but their children are never
    /// visited.
    pub fn skip_children(mut self, matcher: Matcher) -> Self {
        self.skip_children.push(matcher);
        self
    }

    /// Once an element matching this has been yielded, the traversal
    /// yields no further elements.
    pub fn terminate_after(mut self, matcher: Matcher) -> Self {
        self.terminate_after.push(matcher);
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn child_relation(mut self, relation: ChildRelation) -> Self {
        self.relation = relation;
        self
    }
}

/// A lazy, depth-first pre-order cursor over an accessibility tree.
///
/// Each call to [`next`](Traversal::next) does exactly the work needed to
/// produce the next element: deadline and exclusion checks happen before
/// any children are read, and children are only fetched for elements that
/// are neither excluded nor marked `skip_children`.
pub struct Traversal {
    config: TraversalConfig,
    stack: Vec<(ElementHandle, usize)>,
    terminated: bool,
}

impl Traversal {
    pub fn new(root: ElementHandle, config: TraversalConfig) -> Self {
        Self {
            config,
            stack: vec![(root, 0)],
            terminated: false,
        }
    }

    /// Pull the next element in pre-order, or `None` once the tree is
    /// exhausted, the deadline has passed, or a `terminate_after` matcher
    /// fired on the previously yielded element.
    pub async fn next(&mut self) -> Result<Option<ElementHandle>, HarvesterError> {
        if self.terminated {
            return Ok(None);
        }
        loop {
            if self.config.deadline.has_passed() {
                self.terminated = true;
                return Ok(None);
            }
            let (element, depth) = match self.stack.pop() {
                Some(entry) => entry,
                None => return Ok(None),
            };
            if depth > self.config.max_depth {
                continue;
            }

            let mut excluded = false;
            for matcher in &self.config.exclude {
                if matcher.matches(&element).await? {
                    excluded = true;
                    break;
                }
            }
            if excluded {
                continue;
            }

            let mut skip = false;
            for matcher in &self.config.skip_children {
                if matcher.matches(&element).await? {
                    skip = true;
                    break;
                }
            }
            if !skip && depth < self.config.max_depth {
                let children = element.children(self.config.relation).await?;
                for child in children.into_iter().rev() {
                    self.stack.push((child, depth + 1));
                }
            }

            for matcher in &self.config.terminate_after {
                if matcher.matches(&element).await? {
                    self.terminated = true;
                    break;
                }
            }

            return Ok(Some(element));
        }
    }
}

/// Run `rules` against every element of a traversal, in pre-order.
///
/// When `find_in_order` is set, rule `k` (k > 0) is only evaluated once
/// every rule before it has matched at least once — modelling a parser
/// that must see a heading before it will recognize the messages that
/// follow it, without needing a hand-written state machine for the
/// gating itself.
pub async fn traverse_with_rules(
    root: ElementHandle,
    config: TraversalConfig,
    rules: &mut [Rule<'_>],
    find_in_order: bool,
    terminate_after_any_rule: bool,
    terminate_after_all_rules: bool,
) -> Result<(), HarvesterError> {
    let mut traversal = Traversal::new(root, config);
    let mut matched = vec![false; rules.len()];

    while let Some(element) = traversal.next().await? {
        for index in 0..rules.len() {
            if find_in_order && index > 0 && !matched[..index].iter().all(|m| *m) {
                continue;
            }
            if rules[index].matcher.matches(&element).await? {
                rules[index].apply(&element).await?;
                matched[index] = true;
            }
        }
        if terminate_after_any_rule && matched.iter().any(|m| *m) {
            break;
        }
        if terminate_after_all_rules && !matched.is_empty() && matched.iter().all(|m| *m) {
            break;
        }
    }
    Ok(())
}

/// First element matching `matcher`, or `None` if the tree is exhausted
/// first. Stops reading the tree as soon as a match is found.
pub async fn find_element(
    root: ElementHandle,
    config: TraversalConfig,
    matcher: Matcher,
) -> Result<Option<ElementHandle>, HarvesterError> {
    let mut traversal = Traversal::new(root, config);
    while let Some(element) = traversal.next().await? {
        if matcher.matches(&element).await? {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

/// Every element matching `matcher`, in pre-order.
pub async fn find_elements(
    root: ElementHandle,
    config: TraversalConfig,
    matcher: Matcher,
) -> Result<Vec<ElementHandle>, HarvesterError> {
    let mut traversal = Traversal::new(root, config);
    let mut out = Vec::new();
    while let Some(element) = traversal.next().await? {
        if matcher.matches(&element).await? {
            out.push(element);
        }
    }
    Ok(out)
}

/// Concatenate the `value` text of every element matching `matcher`,
/// joined by `separator`.
pub async fn collect_tree_values(
    root: ElementHandle,
    config: TraversalConfig,
    matcher: Matcher,
    separator: &str,
) -> Result<String, HarvesterError> {
    let mut traversal = Traversal::new(root, config);
    let mut parts = Vec::new();
    while let Some(element) = traversal.next().await? {
        if matcher.matches(&element).await? {
            if let Some(value) = element.value().await? {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
        }
    }
    Ok(parts.join(separator))
}

/// Like [`collect_tree_values`], but falls back to `description` for
/// elements whose `value` is absent or blank.
pub async fn collect_tree_values_or_descriptions(
    root: ElementHandle,
    config: TraversalConfig,
    matcher: Matcher,
    separator: &str,
) -> Result<String, HarvesterError> {
    let mut traversal = Traversal::new(root, config);
    let mut parts = Vec::new();
    while let Some(element) = traversal.next().await? {
        if matcher.matches(&element).await? {
            let value = element.value().await?.filter(|v| !v.trim().is_empty());
            let chosen = match value {
                Some(v) => Some(v),
                None => element.description().await?.filter(|d| !d.trim().is_empty()),
            };
            if let Some(text) = chosen {
                parts.push(text.trim().to_string());
            }
        }
    }
    Ok(parts.join(separator))
}
