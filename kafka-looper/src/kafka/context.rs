use std::sync::{Arc, PoisonError, RwLock};

use rdkafka::consumer::{BaseConsumer, ConsumerContext, Rebalance};
use rdkafka::error::KafkaResult;
use rdkafka::{ClientContext, TopicPartitionList};
use tracing::{debug, error, info, warn};

use crate::kafka::types::partitions_of;
use crate::rebalance::RebalanceListener;

/// Consumer context that hands assignment changes to the registered listener.
///
/// librdkafka calls `pre_rebalance` on the thread driving the consumer, which
/// for a `StreamConsumer` is whoever is awaiting `recv()`: the looper's
/// control task. The listener therefore runs before the new assignment is
/// applied and before any message from it can be returned.
#[derive(Default)]
pub struct LooperContext {
    listener: RwLock<Option<Arc<dyn RebalanceListener>>>,
}

impl LooperContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener(&self, listener: Arc<dyn RebalanceListener>) {
        let mut slot = self
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(listener);
    }

    fn listener(&self) -> Option<Arc<dyn RebalanceListener>> {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ClientContext for LooperContext {}

impl ConsumerContext for LooperContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        let Some(listener) = self.listener() else {
            warn!(
                "Rebalance before a listener was registered: {:?}",
                rebalance
            );
            return;
        };

        match rebalance {
            Rebalance::Assign(partitions) => {
                listener.partitions_assigned(&partitions_of(partitions));
            }
            Rebalance::Revoke(partitions) => {
                listener.partitions_revoked(&partitions_of(partitions));
            }
            Rebalance::Error(e) => {
                error!("Rebalance error: {}", e);
            }
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        debug!("Post-rebalance event: {:?}", rebalance);
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(_) => {
                info!("Committed offsets for {} partitions", offsets.count());
            }
            Err(e) => {
                warn!("Failed to commit offsets: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::types::Partition;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        assigned: Mutex<Vec<Partition>>,
    }

    impl RebalanceListener for Recorder {
        fn partitions_assigned(&self, partitions: &[Partition]) {
            self.assigned.lock().unwrap().extend_from_slice(partitions);
        }

        fn partitions_revoked(&self, _partitions: &[Partition]) {}
    }

    #[test]
    fn test_listener_slot_is_replaceable() {
        let context = LooperContext::new();
        assert!(context.listener().is_none());

        let first = Arc::new(Recorder::default());
        context.set_listener(first.clone());
        context
            .listener()
            .unwrap()
            .partitions_assigned(&[Partition::new("events", 0)]);
        assert_eq!(first.assigned.lock().unwrap().len(), 1);

        let second = Arc::new(Recorder::default());
        context.set_listener(second.clone());
        context
            .listener()
            .unwrap()
            .partitions_assigned(&[Partition::new("events", 1)]);
        assert_eq!(first.assigned.lock().unwrap().len(), 1);
        assert_eq!(
            *second.assigned.lock().unwrap(),
            vec![Partition::new("events", 1)]
        );
    }
}
