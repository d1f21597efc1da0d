//! Caller-supplied hooks the looper invokes around each message.
//!
//! | hook            | required | called                                          |
//! |-----------------|----------|-------------------------------------------------|
//! | [`EventHandler`]  | yes      | once per message the filter accepts             |
//! | [`Filter`]        | no       | once per message, before the handler            |
//! | [`ErrorObserver`] | no       | once per handler error, never on success        |
//! | [`CloseHandler`]  | no       | at most once, when the loop stops               |
//!
//! Handler errors are not retried and do not hold back the offset: the message
//! is treated as done either way. Without an observer the error is only logged
//! at debug level, so handlers that care about failures must deal with them
//! themselves or register an observer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::kafka::message::ConsumedMessage;

/// Decides whether a message reaches the event handler. Rejected messages
/// still count as completed.
pub trait Filter: Send + Sync {
    fn accept(&self, message: &ConsumedMessage) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&ConsumedMessage) -> bool + Send + Sync,
{
    fn accept(&self, message: &ConsumedMessage) -> bool {
        self(message)
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, message: &ConsumedMessage) -> anyhow::Result<()>;
}

pub trait ErrorObserver: Send + Sync {
    fn observe(&self, message: &ConsumedMessage, error: &anyhow::Error);
}

impl<F> ErrorObserver for F
where
    F: Fn(&ConsumedMessage, &anyhow::Error) + Send + Sync,
{
    fn observe(&self, message: &ConsumedMessage, error: &anyhow::Error) {
        self(message, error)
    }
}

/// Caller cleanup run when the loop stops, before the subscription closes.
pub trait CloseHandler: Send + Sync {
    fn on_close(&self);
}

impl<F> CloseHandler for F
where
    F: Fn() + Send + Sync,
{
    fn on_close(&self) {
        self()
    }
}

/// The hook set shared by every worker task.
#[derive(Clone)]
pub struct Hooks {
    pub(crate) handler: Arc<dyn EventHandler>,
    pub(crate) filter: Option<Arc<dyn Filter>>,
    pub(crate) error_observer: Option<Arc<dyn ErrorObserver>>,
}

impl Hooks {
    pub(crate) fn accepts(&self, message: &ConsumedMessage) -> bool {
        self.filter.as_ref().map_or(true, |f| f.accept(message))
    }
}

/// Logs every message it sees.
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn handle(&self, message: &ConsumedMessage) -> anyhow::Result<()> {
        info!(
            topic = message.topic(),
            partition = message.partition_number(),
            offset = message.offset(),
            key = ?message.key_as_str(),
            payload_bytes = message.payload().map_or(0, |p| p.len()),
            "received message"
        );
        Ok(())
    }
}
