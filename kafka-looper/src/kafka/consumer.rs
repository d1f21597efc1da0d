use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use tracing::{debug, info};

use crate::error::SubscriptionError;
use crate::kafka::context::LooperContext;
use crate::kafka::message::ConsumedMessage;
use crate::kafka::types::{to_topic_partition_list, PartitionOffset};
use crate::rebalance::RebalanceListener;
use crate::subscription::Subscription;

/// [`Subscription`] backed by an rdkafka `StreamConsumer`.
pub struct KafkaSubscription {
    consumer: StreamConsumer<LooperContext>,
}

impl KafkaSubscription {
    pub fn new(config: &ClientConfig) -> Result<Self, SubscriptionError> {
        debug!("rdkafka configuration: {:?}", config);
        let consumer: StreamConsumer<LooperContext> =
            config.create_with_context(LooperContext::new())?;
        Ok(Self { consumer })
    }
}

#[async_trait]
impl Subscription for KafkaSubscription {
    fn subscribe(
        &mut self,
        topic: &str,
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<(), SubscriptionError> {
        // The listener has to be in place before the first poll can trigger a rebalance
        self.consumer.context().set_listener(listener);
        self.consumer.subscribe(&[topic])?;
        info!(topic, "Subscribed to topic");
        Ok(())
    }

    async fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ConsumedMessage>, SubscriptionError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(message)) => Ok(Some(ConsumedMessage::from_borrowed(&message))),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    fn commit(&self, offsets: &[PartitionOffset]) -> Result<(), SubscriptionError> {
        let list = to_topic_partition_list(offsets)?;
        self.consumer.commit(&list, CommitMode::Sync)?;
        Ok(())
    }

    fn close(self) {
        self.consumer.unsubscribe();
        // Dropping the consumer runs the group leave and closes the client
        drop(self.consumer);
        info!("Kafka consumer closed");
    }
}
