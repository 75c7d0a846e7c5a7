//! Accessibility façade (C1): a minimal capability-based view over an opaque
//! accessibility graph, polymorphic over a real OS-backed element and a
//! JSON-backed mock used for offline parser development and tests.
//!
//! The façade never caches. Every accessor is fallible and latency-bound —
//! callers combine it with [`crate::deadline::Deadline`] at every traversal
//! step, never inside the façade itself.

mod element;
mod mock;
mod system;

pub use element::{ChildRelation, Element, ElementHandle};
pub use mock::MockElement;
pub use system::{RawAccessibilityNode, RawAccessibilityProvider, SystemElement};
