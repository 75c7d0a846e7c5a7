// src/accessibility/element.rs
// Capability-based accessibility element trait (C1).

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::HarvesterError;

/// Shared handle to a node in the accessibility graph.
///
/// Ownership is borrowed from the OS for the span of a traversal; the core
/// never holds an `ElementHandle` past the traversal that produced it.
pub type ElementHandle = Arc<dyn Element>;

/// Which relation a traversal descends through.
///
/// The accessibility tree may expose apparent cycles through "parent"
/// references; the traversal engine must only ever descend via `Children`
/// or `Contents`, never `parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRelation {
    /// The standard `children` relation.
    Children,
    /// An alternate "contents" relation some platforms expose (e.g. a
    /// scroll area's visible content versus its full child list).
    Contents,
}

/// A node in the platform accessibility graph.
///
/// Every accessor is fallible (the OS call can fail or hang) — this trait
/// does not impose a timeout itself; callers combine it with a
/// [`crate::deadline::Deadline`] at each traversal step.
#[async_trait]
pub trait Element: Send + Sync {
    async fn role(&self) -> Result<Option<String>, HarvesterError>;
    async fn subrole(&self) -> Result<Option<String>, HarvesterError>;
    async fn title(&self) -> Result<Option<String>, HarvesterError>;
    async fn value(&self) -> Result<Option<String>, HarvesterError>;
    async fn description(&self) -> Result<Option<String>, HarvesterError>;
    async fn dom_identifier(&self) -> Result<Option<String>, HarvesterError>;
    async fn dom_class_list(&self) -> Result<Vec<String>, HarvesterError>;
    async fn attribute(&self, name: &str) -> Result<Option<String>, HarvesterError>;
    async fn children(&self, relation: ChildRelation) -> Result<Vec<ElementHandle>, HarvesterError>;
    async fn position(&self) -> Result<Option<(f64, f64)>, HarvesterError>;
    async fn size(&self) -> Result<Option<(f64, f64)>, HarvesterError>;

    /// Window/process identifier, where meaningful (used by Teams' PID-keyed
    /// "unlock" state, C4.6).
    fn pid(&self) -> Option<i32> {
        None
    }
}
