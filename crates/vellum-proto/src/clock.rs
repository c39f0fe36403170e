//! Vector clocks.
//!
//! Each peer tracks a monotonically increasing counter per node ID. A
//! clock summarizes how much of every peer's history has been observed;
//! merging two clocks is a pointwise maximum, which makes merge
//! associative, commutative, and idempotent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping of peer identifier to a monotonically increasing counter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock from entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, u64)>) -> Self {
        VectorClock {
            entries: entries.into_iter().collect(),
        }
    }

    /// Get the counter for a node (0 if never seen).
    pub fn get(&self, node_id: &str) -> u64 {
        self.entries.get(node_id).copied().unwrap_or(0)
    }

    /// Increment the counter for a node, returning the new value.
    pub fn increment(&mut self, node_id: &str) -> u64 {
        let entry = self.entries.entry(node_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Merge another clock into this one (pointwise maximum).
    pub fn merge(&mut self, other: &VectorClock) {
        for (node_id, &counter) in &other.entries {
            let current = self.entries.entry(node_id.clone()).or_insert(0);
            *current = (*current).max(counter);
        }
    }

    /// Return the merge of two clocks without modifying self.
    pub fn merged_with(&self, other: &VectorClock) -> VectorClock {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Check if this clock dominates another: self[n] >= other[n] for all n.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other
            .entries
            .iter()
            .all(|(node_id, &counter)| self.get(node_id) >= counter)
    }

    /// Check if two clocks are concurrent (neither dominates).
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.entries.iter()
    }

    /// Number of nodes tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the clock is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment() {
        let mut clock = VectorClock::new();
        assert_eq!(clock.get("n1"), 0);
        assert_eq!(clock.increment("n1"), 1);
        assert_eq!(clock.increment("n1"), 2);
        assert_eq!(clock.get("n1"), 2);
    }

    #[test]
    fn test_merge_pointwise_max() {
        let a = VectorClock::from_entries([("n1".to_string(), 5), ("n2".to_string(), 3)]);
        let b = VectorClock::from_entries([("n1".to_string(), 3), ("n2".to_string(), 7)]);

        let merged = a.merged_with(&b);
        assert_eq!(merged.get("n1"), 5);
        assert_eq!(merged.get("n2"), 7);
    }

    #[test]
    fn test_merge_idempotent() {
        let mut a = VectorClock::from_entries([("n1".to_string(), 5)]);
        let b = VectorClock::from_entries([("n1".to_string(), 3), ("n2".to_string(), 7)]);

        a.merge(&b);
        let after_first = a.clone();
        a.merge(&b);
        assert_eq!(a, after_first);
    }

    #[test]
    fn test_dominates() {
        let a = VectorClock::from_entries([("n1".to_string(), 5), ("n2".to_string(), 3)]);
        let b = VectorClock::from_entries([("n1".to_string(), 3), ("n2".to_string(), 3)]);

        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(a.dominates(&a));
    }

    #[test]
    fn test_concurrent() {
        let a = VectorClock::from_entries([("n1".to_string(), 5), ("n2".to_string(), 3)]);
        let b = VectorClock::from_entries([("n1".to_string(), 3), ("n2".to_string(), 5)]);

        assert!(a.is_concurrent_with(&b));
        assert!(b.is_concurrent_with(&a));
    }

    #[test]
    fn test_serialization() {
        let clock = VectorClock::from_entries([("n1".to_string(), 5), ("n2".to_string(), 10)]);
        let json = serde_json::to_string(&clock).unwrap();
        assert_eq!(json, r#"{"n1":5,"n2":10}"#);
        let back: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(clock, back);
    }
}
