// Kafka module - rdkafka-backed subscription and the types the looper shares with it
pub mod config;
pub mod consumer;
pub mod context;
pub mod message;
pub mod types;

// Public API
pub use config::ConsumerConfigBuilder;
pub use consumer::KafkaSubscription;
pub use message::ConsumedMessage;
pub use types::{Partition, PartitionOffset};
