use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

/// Misconfiguration caught before any consumer is created.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("workers must be greater than zero")]
    ZeroWorkers,
    #[error("num_per_commit must be greater than zero")]
    ZeroNumPerCommit,
    #[error("num_per_commit ({num_per_commit}) must be a multiple of workers ({workers})")]
    UnevenCommitCadence {
        num_per_commit: usize,
        workers: usize,
    },
    #[error("an event handler is required")]
    MissingEventHandler,
    #[error("a topic is required")]
    MissingTopic,
}

/// Errors surfaced by a [`Subscription`](crate::subscription::Subscription).
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("transient consumer error: {0}")]
    Transient(String),
    #[error("fatal consumer error: {0}")]
    Fatal(String),
}

impl SubscriptionError {
    /// Whether the loop has to stop. Everything else is logged and polled past.
    pub fn is_fatal(&self) -> bool {
        match self {
            SubscriptionError::Kafka(e) => is_fatal_kafka_error(e),
            SubscriptionError::Transient(_) => false,
            SubscriptionError::Fatal(_) => true,
        }
    }
}

fn is_fatal_kafka_error(e: &KafkaError) -> bool {
    match e {
        KafkaError::MessageConsumptionFatal(_) => true,
        KafkaError::Canceled => true,
        KafkaError::Global(RDKafkaErrorCode::Authentication) => true,
        _ => false,
    }
}

/// Reasons the poll loop stopped other than a shutdown signal.
#[derive(Error, Debug)]
pub enum LooperError {
    #[error("failed to subscribe to topic {topic}: {source}")]
    Subscribe {
        topic: String,
        source: SubscriptionError,
    },
    #[error("fatal error while polling: {0}")]
    Poll(SubscriptionError),
    #[error("failed to commit offsets: {0}")]
    Commit(SubscriptionError),
    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_error_classification() {
        let transient = [
            KafkaError::MessageConsumption(RDKafkaErrorCode::PartitionEOF),
            KafkaError::MessageConsumption(RDKafkaErrorCode::OffsetOutOfRange),
            KafkaError::Global(RDKafkaErrorCode::AllBrokersDown),
            KafkaError::Global(RDKafkaErrorCode::BrokerTransportFailure),
        ];
        for e in transient {
            assert!(!SubscriptionError::from(e).is_fatal());
        }

        let fatal = [
            KafkaError::MessageConsumptionFatal(RDKafkaErrorCode::Fatal),
            KafkaError::Canceled,
            KafkaError::Global(RDKafkaErrorCode::Authentication),
        ];
        for e in fatal {
            assert!(SubscriptionError::from(e).is_fatal());
        }
    }

    #[test]
    fn test_config_error_messages() {
        let e = ConfigError::UnevenCommitCadence {
            num_per_commit: 5,
            workers: 2,
        };
        assert_eq!(
            e.to_string(),
            "num_per_commit (5) must be a multiple of workers (2)"
        );
    }
}
