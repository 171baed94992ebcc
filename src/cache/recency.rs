//! Recency Index Module
//!
//! Orders keys by last access for least-recently-accessed eviction.

use std::collections::BTreeMap;

// == Recency Index ==
/// Tracks access order with a monotonically increasing sequence number.
///
/// Each key sits at the sequence number of its latest access; the smallest
/// number is the eviction candidate. Entries accessed in the same millisecond
/// keep their relative order, which makes ties deterministic.
#[derive(Debug, Default)]
pub struct RecencyIndex {
    /// Access sequence -> key
    order: BTreeMap<u64, String>,
    /// Next sequence number to hand out
    next_seq: u64,
}

impl RecencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Registers a new key as most recently accessed and returns its sequence.
    pub fn insert(&mut self, key: &str) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.to_string());
        seq
    }

    // == Touch ==
    /// Moves the key at `seq` to the most recent position.
    ///
    /// Returns the key's new sequence number.
    pub fn touch(&mut self, seq: u64) -> u64 {
        match self.order.remove(&seq) {
            Some(key) => self.insert(&key),
            None => seq,
        }
    }

    // == Remove ==
    pub fn remove(&mut self, seq: u64) {
        self.order.remove(&seq);
    }

    // == Oldest ==
    /// Returns the least recently accessed key without removing it.
    pub fn oldest(&self) -> Option<&str> {
        self.order.values().next().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recency_new() {
        let index = RecencyIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.oldest(), None);
    }

    #[test]
    fn test_insert_order() {
        let mut index = RecencyIndex::new();

        index.insert("key1");
        index.insert("key2");
        index.insert("key3");

        assert_eq!(index.len(), 3);
        assert_eq!(index.oldest(), Some("key1"));
    }

    #[test]
    fn test_touch_moves_to_most_recent() {
        let mut index = RecencyIndex::new();

        let a = index.insert("a");
        index.insert("b");
        index.insert("c");

        let a = index.touch(a);
        assert_eq!(index.oldest(), Some("b"));

        // Touching twice keeps a single slot per key
        index.touch(a);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_remove() {
        let mut index = RecencyIndex::new();

        let a = index.insert("a");
        index.insert("b");
        index.remove(a);

        assert_eq!(index.len(), 1);
        assert_eq!(index.oldest(), Some("b"));
    }

    #[test]
    fn test_touch_unknown_sequence_is_noop() {
        let mut index = RecencyIndex::new();
        index.insert("a");

        assert_eq!(index.touch(99), 99);
        assert_eq!(index.len(), 1);
    }
}
