//! Generation tracking across consumer group rebalances.
//!
//! Every assignment starts a new generation. Work dispatched under an older
//! generation may still finish, but its offset belongs to an assignment this
//! process may no longer own, so it is dropped instead of being committed.
//!
//! The generation bump and the ledger reset happen while holding the ledger
//! lock, and completions compare generations under the same lock. A worker
//! that read generation `g` therefore either lands in the ledger before the
//! reset (and is wiped by it) or sees the new generation and backs off.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::kafka::types::{Partition, PartitionOffset};
use crate::ledger::OffsetLedger;
use crate::metrics_consts::{
    OFFSET_COMMITS, REBALANCE_EVENTS, REBALANCE_GENERATION, WORKER_STALE_COMPLETIONS,
};

/// Receives partition assignment changes from a
/// [`Subscription`](crate::subscription::Subscription).
///
/// Called synchronously on the polling task, before the subscription starts
/// (or stops) consuming the partitions involved. Implementations must not block.
pub trait RebalanceListener: Send + Sync {
    fn partitions_assigned(&self, partitions: &[Partition]);

    fn partitions_revoked(&self, partitions: &[Partition]);
}

#[derive(Debug, Default)]
pub struct RebalanceTracker {
    generation: AtomicU64,
    ledger: Mutex<OffsetLedger>,
}

impl RebalanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation a worker captures at dispatch time.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    // A panicking worker cannot leave the ledger half-written: every
    // mutation is a single insert or clear.
    fn ledger(&self) -> MutexGuard<'_, OffsetLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a finished message by the offset its partition resumes from.
    /// Returns false, without touching the ledger, when `generation` is no
    /// longer current.
    pub fn record_completion(
        &self,
        generation: u64,
        partition: &Partition,
        next_offset: i64,
    ) -> bool {
        let mut ledger = self.ledger();
        let current = self.generation.load(Ordering::SeqCst);
        if generation != current {
            debug!(
                %partition,
                next_offset,
                dispatch_generation = generation,
                current_generation = current,
                "Discarding completion from a previous generation"
            );
            metrics::counter!(WORKER_STALE_COMPLETIONS).increment(1);
            return false;
        }
        ledger.record(partition, next_offset);
        true
    }

    /// The offsets to commit for a batch dispatched under `generation`, or
    /// `None` when there is nothing to commit or the batch went stale.
    pub fn committable(&self, generation: u64) -> Option<Vec<PartitionOffset>> {
        let ledger = self.ledger();
        if ledger.is_empty() {
            return None;
        }
        let current = self.generation.load(Ordering::SeqCst);
        if generation != current {
            info!(
                batch_generation = generation,
                current_generation = current,
                "Abandoning commit for a batch from a previous generation"
            );
            metrics::counter!(OFFSET_COMMITS, "status" => "stale").increment(1);
            return None;
        }
        Some(ledger.snapshot())
    }

    /// Number of partitions currently holding uncommitted progress.
    pub fn pending_partitions(&self) -> usize {
        self.ledger().len()
    }
}

impl RebalanceListener for RebalanceTracker {
    fn partitions_assigned(&self, partitions: &[Partition]) {
        let mut ledger = self.ledger();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let dropped = ledger.len();
        ledger.clear();
        drop(ledger);

        info!(
            generation,
            partitions = partitions.len(),
            dropped_ledger_entries = dropped,
            "Rebalance - assigned: {:?}",
            partitions
        );
        metrics::counter!(REBALANCE_EVENTS, "event_type" => "assign").increment(1);
        metrics::gauge!(REBALANCE_GENERATION).set(generation as f64);
    }

    fn partitions_revoked(&self, partitions: &[Partition]) {
        // Revocation keeps the generation: if the same partitions come straight
        // back, the next assign resets the ledger anyway.
        info!(
            generation = self.current_generation(),
            partitions = partitions.len(),
            "Rebalance - revoked: {:?}",
            partitions
        );
        metrics::counter!(REBALANCE_EVENTS, "event_type" => "revoke").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;

    fn p(n: i32) -> Partition {
        Partition::new("events", n)
    }

    #[test]
    fn test_generation_starts_at_zero() {
        let tracker = RebalanceTracker::new();
        assert_eq!(tracker.current_generation(), 0);
        assert_eq!(tracker.committable(0), None);
    }

    #[derive(Clone, Copy, Debug)]
    enum Event {
        Assign,
        Revoke,
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![Event::Revoke, Event::Revoke])]
    #[case(vec![Event::Assign, Event::Revoke, Event::Assign])]
    #[case(vec![Event::Revoke, Event::Assign, Event::Assign, Event::Revoke, Event::Assign])]
    fn test_generation_bumps_once_per_assign(#[case] events: Vec<Event>) {
        let tracker = RebalanceTracker::new();
        let mut expected = 0;
        let mut previous = tracker.current_generation();

        for event in events {
            match event {
                Event::Assign => {
                    tracker.partitions_assigned(&[p(0)]);
                    expected += 1;
                }
                Event::Revoke => tracker.partitions_revoked(&[p(0)]),
            }
            let current = tracker.current_generation();
            assert!(current >= previous, "generation went backwards");
            assert_eq!(current, expected);
            previous = current;
        }
    }

    #[test]
    fn test_stale_completion_never_writes() {
        let tracker = RebalanceTracker::new();
        tracker.partitions_assigned(&[p(0), p(1)]);
        let dispatched_at = tracker.current_generation();

        tracker.partitions_assigned(&[p(0)]);

        assert!(!tracker.record_completion(dispatched_at, &p(1), 6));
        assert_eq!(tracker.pending_partitions(), 0);
        assert_eq!(tracker.committable(tracker.current_generation()), None);
    }

    #[test]
    fn test_assign_resets_ledger() {
        let tracker = RebalanceTracker::new();
        tracker.partitions_assigned(&[p(0)]);
        let g1 = tracker.current_generation();
        assert!(tracker.record_completion(g1, &p(0), 4));
        assert_eq!(tracker.pending_partitions(), 1);

        tracker.partitions_assigned(&[p(0)]);
        assert_eq!(tracker.pending_partitions(), 0);
    }

    #[test]
    fn test_revoke_keeps_ledger_and_generation() {
        let tracker = RebalanceTracker::new();
        tracker.partitions_assigned(&[p(0)]);
        let g = tracker.current_generation();
        assert!(tracker.record_completion(g, &p(0), 4));

        tracker.partitions_revoked(&[p(0)]);
        assert_eq!(tracker.current_generation(), g);
        assert_eq!(
            tracker.committable(g),
            Some(vec![PartitionOffset::new(p(0), 4)])
        );
    }

    #[test]
    fn test_committable_rejects_stale_batch() {
        let tracker = RebalanceTracker::new();
        let g0 = tracker.current_generation();
        assert!(tracker.record_completion(g0, &p(0), 2));
        assert!(tracker.committable(g0).is_some());

        tracker.partitions_assigned(&[p(0)]);
        let g1 = tracker.current_generation();
        assert!(tracker.record_completion(g1, &p(0), 10));

        assert_eq!(tracker.committable(g0), None);
        assert_eq!(
            tracker.committable(g1),
            Some(vec![PartitionOffset::new(p(0), 10)])
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ledger_only_holds_current_generation_under_contention() {
        let tracker = Arc::new(RebalanceTracker::new());
        let mut handles = Vec::new();

        for worker in 0..8i32 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                for offset in 0..500i64 {
                    let g = tracker.current_generation();
                    tokio::task::yield_now().await;
                    tracker.record_completion(g, &p(worker), offset + 1);
                }
            }));
        }

        for _ in 0..20 {
            tracker.partitions_assigned(&[p(0)]);
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Freeze the generation and write a marker; everything left in the
        // ledger must have been written under this final generation.
        tracker.partitions_assigned(&[p(0)]);
        let last = tracker.current_generation();
        assert_eq!(last, 21);
        assert_eq!(tracker.pending_partitions(), 0);
        assert!(tracker.record_completion(last, &p(0), 2));
        assert_eq!(
            tracker.committable(last),
            Some(vec![PartitionOffset::new(p(0), 2)])
        );
    }
}
