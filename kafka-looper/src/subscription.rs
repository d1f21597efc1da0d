use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SubscriptionError;
use crate::kafka::message::ConsumedMessage;
use crate::kafka::types::PartitionOffset;
use crate::rebalance::RebalanceListener;

/// A live membership of one consumer group on one topic.
///
/// The looper is the only caller: it subscribes once, polls from its control
/// task, commits between batches and closes the handle when it stops.
#[async_trait]
pub trait Subscription: Send {
    /// Join the group for `topic`. `listener` must be told about assignment
    /// changes on the polling task, before consumption of the affected
    /// partitions starts or stops.
    fn subscribe(
        &mut self,
        topic: &str,
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<(), SubscriptionError>;

    /// Wait up to `timeout` for the next message. `Ok(None)` means nothing
    /// arrived in time.
    async fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ConsumedMessage>, SubscriptionError>;

    /// Synchronously commit `offsets` to the group.
    fn commit(&self, offsets: &[PartitionOffset]) -> Result<(), SubscriptionError>;

    /// Leave the group and release the connection.
    fn close(self)
    where
        Self: Sized;
}
