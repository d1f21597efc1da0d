//! Offset ledger: the next offset to commit for every partition that has
//! completed work in the current generation.
//!
//! The ledger itself is a plain map. Synchronization is owned by
//! [`RebalanceTracker`](crate::rebalance::RebalanceTracker), which keeps it
//! behind the same lock it uses to bump the generation.

use std::collections::HashMap;

use tracing::debug;

use crate::kafka::types::{Partition, PartitionOffset};

#[derive(Debug, Default)]
pub struct OffsetLedger {
    offsets: HashMap<Partition, i64>,
}

impl OffsetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `partition` is done up to, but not including,
    /// `next_offset`. Never moves a partition backwards, since completions
    /// within a batch arrive in any order.
    pub fn record(&mut self, partition: &Partition, next_offset: i64) {
        match self.offsets.get_mut(partition) {
            Some(current) if *current >= next_offset => {}
            Some(current) => *current = next_offset,
            None => {
                debug!(%partition, next_offset, "Tracking new partition in offset ledger");
                self.offsets.insert(partition.clone(), next_offset);
            }
        }
    }

    pub fn get(&self, partition: &Partition) -> Option<i64> {
        self.offsets.get(partition).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
    }

    /// Commit list for every tracked partition, ordered by topic then partition.
    pub fn snapshot(&self) -> Vec<PartitionOffset> {
        let mut offsets: Vec<PartitionOffset> = self
            .offsets
            .iter()
            .map(|(partition, offset)| PartitionOffset::new(partition.clone(), *offset))
            .collect();
        offsets.sort_by(|a, b| a.partition().cmp(b.partition()));
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_stores_next_offset() {
        let mut ledger = OffsetLedger::new();
        let p0 = Partition::new("events", 0);

        ledger.record(&p0, 11);
        assert_eq!(ledger.get(&p0), Some(11));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_record_never_moves_backwards() {
        let mut ledger = OffsetLedger::new();
        let p0 = Partition::new("events", 0);

        ledger.record(&p0, 13);
        ledger.record(&p0, 11);
        assert_eq!(ledger.get(&p0), Some(13));

        ledger.record(&p0, 21);
        assert_eq!(ledger.get(&p0), Some(21));
    }

    #[test]
    fn test_snapshot_is_sorted_per_partition() {
        let mut ledger = OffsetLedger::new();
        ledger.record(&Partition::new("events", 1), 5);
        ledger.record(&Partition::new("clicks", 0), 9);
        ledger.record(&Partition::new("events", 0), 3);

        let snapshot = ledger.snapshot();
        let keys: Vec<String> = snapshot
            .iter()
            .map(|po| po.partition().to_string())
            .collect();
        assert_eq!(keys, vec!["clicks[0]", "events[0]", "events[1]"]);
        assert_eq!(snapshot[0].offset(), 9);
        assert_eq!(snapshot[1].offset(), 3);
        assert_eq!(snapshot[2].offset(), 5);
    }

    #[test]
    fn test_clear() {
        let mut ledger = OffsetLedger::new();
        ledger.record(&Partition::new("events", 0), 2);
        assert!(!ledger.is_empty());

        ledger.clear();
        assert!(ledger.is_empty());
        assert!(ledger.snapshot().is_empty());
    }
}
