// src/deadline.rs
// Deadline + cancellation (C2).
//
// A deadline is an absolute monotonic instant carried by value through every
// traversal, matcher, and collector check. Cancellation is cooperative: a
// producer that sees a passed deadline returns early with whatever it has
// collected so far; there is no forced teardown.

use std::time::{Duration, Instant};

/// An absolute monotonic deadline, or the distinguished value `never`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never passes.
    pub fn never() -> Self {
        Deadline(None)
    }

    /// A deadline `duration` from now.
    pub fn from_now(duration: Duration) -> Self {
        Deadline(Some(Instant::now() + duration))
    }

    /// An explicit absolute instant.
    pub fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    /// Whether the deadline has already passed.
    pub fn has_passed(&self) -> bool {
        match self.0 {
            Some(instant) => Instant::now() >= instant,
            None => false,
        }
    }

    /// Remaining duration until the deadline, or `None` for `never`.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|instant| instant.saturating_duration_since(Instant::now()))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_does_not_pass() {
        assert!(!Deadline::never().has_passed());
    }

    #[test]
    fn from_now_passes_after_duration() {
        let d = Deadline::from_now(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(d.has_passed());
    }

    #[test]
    fn from_now_has_not_passed_immediately() {
        let d = Deadline::from_now(Duration::from_secs(60));
        assert!(!d.has_passed());
    }
}
