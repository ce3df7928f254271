//! Vector clocks: per-participant counters defining the happens-before
//! partial order over operations.
//!
//! A missing entry reads as zero, so clocks of different support compare
//! correctly and `{alice: 0}` equals the empty clock. Entries are kept in
//! a `BTreeMap` so serialized clocks are byte-stable across participants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from participant id to a monotonic counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Empty clock (all participants at zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `participant`, zero if absent.
    pub fn get(&self, participant: &str) -> u64 {
        self.entries.get(participant).copied().unwrap_or(0)
    }

    /// Set an explicit counter value.
    pub fn set(&mut self, participant: impl Into<String>, counter: u64) {
        self.entries.insert(participant.into(), counter);
    }

    /// Bump one participant's counter, returning the new value.
    pub fn increment(&mut self, participant: &str) -> u64 {
        let counter = self.entries.entry(participant.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Componentwise max with `other`, in place.
    pub fn merge(&mut self, other: &VectorClock) {
        for (participant, &counter) in &other.entries {
            let entry = self.entries.entry(participant.clone()).or_insert(0);
            if *entry < counter {
                *entry = counter;
            }
        }
    }

    /// True when every entry of `self` is ≤ the matching entry of
    /// `other` and at least one is strictly smaller.
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        let mut strictly_smaller = false;
        for participant in self.entries.keys().chain(other.entries.keys()) {
            let ours = self.get(participant);
            let theirs = other.get(participant);
            if ours > theirs {
                return false;
            }
            if ours < theirs {
                strictly_smaller = true;
            }
        }
        strictly_smaller
    }

    /// Neither clock happens-before the other and they are not equal.
    pub fn concurrent_with(&self, other: &VectorClock) -> bool {
        !self.happens_before(other) && !other.happens_before(self) && self != other
    }

    /// Participants with an explicit entry.
    pub fn participants(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of explicit entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no explicit entries exist.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Missing entries read as zero, so equality must look at the union of
// both supports rather than comparing the maps directly.
impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.entries
            .keys()
            .chain(other.entries.keys())
            .all(|participant| self.get(participant) == other.get(participant))
    }
}

impl Eq for VectorClock {}

impl<S: Into<String>, const N: usize> From<[(S, u64); N]> for VectorClock {
    fn from(entries: [(S, u64); N]) -> Self {
        let mut clock = VectorClock::new();
        for (participant, counter) in entries {
            clock.set(participant, counter);
        }
        clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entries_read_as_zero() {
        let clock = VectorClock::from([("alice", 3)]);
        assert_eq!(clock.get("alice"), 3);
        assert_eq!(clock.get("bob"), 0);
    }

    #[test]
    fn test_increment_and_merge() {
        let mut a = VectorClock::new();
        assert_eq!(a.increment("alice"), 1);
        assert_eq!(a.increment("alice"), 2);

        let b = VectorClock::from([("alice", 1), ("bob", 5)]);
        a.merge(&b);
        assert_eq!(a.get("alice"), 2); // merge never rewinds
        assert_eq!(a.get("bob"), 5);
    }

    #[test]
    fn test_happens_before_strict() {
        let a = VectorClock::from([("alice", 1)]);
        let b = VectorClock::from([("alice", 2)]);
        assert!(a.happens_before(&b));
        assert!(!b.happens_before(&a));
        assert!(!a.happens_before(&a)); // irreflexive
    }

    #[test]
    fn test_happens_before_different_support() {
        // {alice:1} < {alice:1, bob:1} because bob reads as 0 on the left
        let a = VectorClock::from([("alice", 1)]);
        let b = VectorClock::from([("alice", 1), ("bob", 1)]);
        assert!(a.happens_before(&b));
        assert!(!b.happens_before(&a));
    }

    #[test]
    fn test_concurrent_clocks() {
        let a = VectorClock::from([("alice", 1)]);
        let b = VectorClock::from([("bob", 1)]);
        assert!(a.concurrent_with(&b));
        assert!(b.concurrent_with(&a));
    }

    #[test]
    fn test_identical_clocks_not_concurrent() {
        let a = VectorClock::from([("alice", 2), ("bob", 1)]);
        let b = VectorClock::from([("alice", 2), ("bob", 1)]);
        assert_eq!(a, b);
        assert!(!a.concurrent_with(&b));
    }

    #[test]
    fn test_equality_ignores_zero_entries() {
        let mut a = VectorClock::new();
        a.set("alice", 0);
        let b = VectorClock::new();
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert!(!a.concurrent_with(&b));
    }

    #[test]
    fn test_empty_vs_empty_equal() {
        assert_eq!(VectorClock::new(), VectorClock::new());
        assert!(!VectorClock::new().happens_before(&VectorClock::new()));
    }

    #[test]
    fn test_single_participant_totally_ordered() {
        let clocks: Vec<VectorClock> =
            (1..=4).map(|n| VectorClock::from([("alice", n)])).collect();
        for i in 0..clocks.len() {
            for j in (i + 1)..clocks.len() {
                assert!(clocks[i].happens_before(&clocks[j]));
                assert!(!clocks[i].concurrent_with(&clocks[j]));
            }
        }
    }

    #[test]
    fn test_serde_roundtrip() {
        let clock = VectorClock::from([("alice", 2), ("bob", 7)]);
        let json = serde_json::to_string(&clock).unwrap();
        assert_eq!(json, r#"{"alice":2,"bob":7}"#);
        let back: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(clock, back);
    }
}
