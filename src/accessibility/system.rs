// src/accessibility/system.rs
// OS-backed accessibility element.
//
// The host-OS accessibility API is an out-of-scope external collaborator
// (spec.md §1): this module only defines the narrow trait the core needs
// from it (`RawAccessibilityProvider`/`RawAccessibilityNode`) and a thin
// `Element` adapter over it. No OS bindings are vendored here; a real
// integration plugs in a concrete `RawAccessibilityProvider` behind
// `#[cfg(target_os = "macos")]` (or equivalent) at the application layer.

use async_trait::async_trait;
use std::sync::Arc;

use super::element::{ChildRelation, Element, ElementHandle};
use crate::error::HarvesterError;

/// A single raw node as returned by the host accessibility API.
///
/// Every accessor mirrors [`Element`] but is synchronous and may block on an
/// OS call; `SystemElement` runs these on a blocking thread so the async
/// traversal never stalls the executor.
pub trait RawAccessibilityNode: Send + Sync {
    fn role(&self) -> anyhow::Result<Option<String>>;
    fn subrole(&self) -> anyhow::Result<Option<String>>;
    fn title(&self) -> anyhow::Result<Option<String>>;
    fn value(&self) -> anyhow::Result<Option<String>>;
    fn description(&self) -> anyhow::Result<Option<String>>;
    fn dom_identifier(&self) -> anyhow::Result<Option<String>>;
    fn dom_class_list(&self) -> anyhow::Result<Vec<String>>;
    fn attribute(&self, name: &str) -> anyhow::Result<Option<String>>;
    fn children(&self) -> anyhow::Result<Vec<Arc<dyn RawAccessibilityNode>>>;
    fn contents(&self) -> anyhow::Result<Vec<Arc<dyn RawAccessibilityNode>>>;
    fn position(&self) -> anyhow::Result<Option<(f64, f64)>>;
    fn size(&self) -> anyhow::Result<Option<(f64, f64)>>;
    fn pid(&self) -> Option<i32>;
}

/// Window/process enumeration, hit-testing, etc. — owned by the out-of-scope
/// process/window enumerator collaborator named in spec.md §1. The harvester
/// only needs a root node per window; enumeration itself is not this crate's
/// concern.
pub trait RawAccessibilityProvider: Send + Sync {
    /// Root accessibility node for a given window handle.
    fn root_for_window(&self, window_id: u64) -> anyhow::Result<Arc<dyn RawAccessibilityNode>>;

    /// Hit-test at a point within a window, returning the topmost element
    /// there (used by the Teams parser's "unlock" step, C4.6).
    fn hit_test(&self, x: f64, y: f64) -> anyhow::Result<Option<Arc<dyn RawAccessibilityNode>>>;
}

/// Adapts a [`RawAccessibilityNode`] to the async [`Element`] façade.
pub struct SystemElement {
    raw: Arc<dyn RawAccessibilityNode>,
}

impl SystemElement {
    pub fn new(raw: Arc<dyn RawAccessibilityNode>) -> ElementHandle {
        Arc::new(Self { raw })
    }
}

/// Runs a fallible synchronous OS accessor on a blocking thread.
async fn blocking<T, F>(f: F) -> Result<T, HarvesterError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(HarvesterError::from)?
        .map_err(|e| HarvesterError::AccessibilityUnavailable(e.to_string()))
}

#[async_trait]
impl Element for SystemElement {
    async fn role(&self) -> Result<Option<String>, HarvesterError> {
        let raw = self.raw.clone();
        blocking(move || raw.role()).await
    }

    async fn subrole(&self) -> Result<Option<String>, HarvesterError> {
        let raw = self.raw.clone();
        blocking(move || raw.subrole()).await
    }

    async fn title(&self) -> Result<Option<String>, HarvesterError> {
        let raw = self.raw.clone();
        blocking(move || raw.title()).await
    }

    async fn value(&self) -> Result<Option<String>, HarvesterError> {
        let raw = self.raw.clone();
        blocking(move || raw.value()).await
    }

    async fn description(&self) -> Result<Option<String>, HarvesterError> {
        let raw = self.raw.clone();
        blocking(move || raw.description()).await
    }

    async fn dom_identifier(&self) -> Result<Option<String>, HarvesterError> {
        let raw = self.raw.clone();
        blocking(move || raw.dom_identifier()).await
    }

    async fn dom_class_list(&self) -> Result<Vec<String>, HarvesterError> {
        let raw = self.raw.clone();
        blocking(move || raw.dom_class_list()).await
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, HarvesterError> {
        let raw = self.raw.clone();
        let name = name.to_string();
        blocking(move || raw.attribute(&name)).await
    }

    async fn children(
        &self,
        relation: ChildRelation,
    ) -> Result<Vec<ElementHandle>, HarvesterError> {
        let raw = self.raw.clone();
        let nodes = blocking(move || match relation {
            ChildRelation::Children => raw.children(),
            ChildRelation::Contents => raw.contents(),
        })
        .await?;
        Ok(nodes.into_iter().map(SystemElement::new).collect())
    }

    async fn position(&self) -> Result<Option<(f64, f64)>, HarvesterError> {
        let raw = self.raw.clone();
        blocking(move || raw.position()).await
    }

    async fn size(&self) -> Result<Option<(f64, f64)>, HarvesterError> {
        let raw = self.raw.clone();
        blocking(move || raw.size()).await
    }

    fn pid(&self) -> Option<i32> {
        self.raw.pid()
    }
}
