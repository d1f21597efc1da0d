//! Test doubles for driving a [`Looper`](crate::looper::Looper) without a broker.
//!
//! [`MockSubscription`] replays a script of [`Step`]s. Rebalance and hook steps
//! run inside the `poll` call that reaches them, the way rdkafka delivers
//! rebalance callbacks while polling, and polling carries on to the next step
//! until a message, an idle tick or an error ends the call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use tokio::sync::Notify;

use crate::error::SubscriptionError;
use crate::hooks::EventHandler;
use crate::kafka::message::ConsumedMessage;
use crate::kafka::types::{Partition, PartitionOffset};
use crate::rebalance::RebalanceListener;
use crate::shutdown::ShutdownController;
use crate::subscription::Subscription;

pub enum Step {
    Message(ConsumedMessage),
    Assign(Vec<Partition>),
    Revoke(Vec<Partition>),
    /// A poll that times out without a message.
    Idle,
    Error(SubscriptionError),
    /// Arbitrary side effect, e.g. releasing a gated handler.
    Hook(Box<dyn FnOnce() + Send>),
}

impl Step {
    pub fn message(topic: &str, partition: i32, offset: i64) -> Self {
        let partition = Partition::new(topic, partition);
        Step::Message(ConsumedMessage::new(partition, offset))
    }

    pub fn hook(f: impl FnOnce() + Send + 'static) -> Self {
        Step::Hook(Box::new(f))
    }
}

#[derive(Default)]
struct Recorded {
    subscribed: Vec<String>,
    commits: Vec<Vec<PartitionOffset>>,
    closes: usize,
    polls: usize,
    fail_commits: bool,
}

/// What a [`MockSubscription`] saw, readable after the looper consumed it.
#[derive(Clone, Default)]
pub struct MockState {
    inner: Arc<Mutex<Recorded>>,
}

impl MockState {
    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.lock().subscribed.clone()
    }

    pub fn commits(&self) -> Vec<Vec<PartitionOffset>> {
        self.lock().commits.clone()
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn poll_count(&self) -> usize {
        self.lock().polls
    }

    /// Make every following commit fail with a broker error.
    pub fn fail_commits(&self) {
        self.lock().fail_commits = true;
    }
}

pub struct MockSubscription {
    steps: VecDeque<Step>,
    listener: Option<Arc<dyn RebalanceListener>>,
    stop_when_exhausted: Option<ShutdownController>,
    subscribe_error: Option<SubscriptionError>,
    state: MockState,
}

impl MockSubscription {
    pub fn new(steps: Vec<Step>) -> (Self, MockState) {
        let state = MockState::default();
        let subscription = Self {
            steps: steps.into(),
            listener: None,
            stop_when_exhausted: None,
            subscribe_error: None,
            state: state.clone(),
        };
        (subscription, state)
    }

    /// Trigger `controller` once the script runs out.
    pub fn stop_when_exhausted(mut self, controller: ShutdownController) -> Self {
        self.stop_when_exhausted = Some(controller);
        self
    }

    pub fn fail_subscribe(mut self, error: SubscriptionError) -> Self {
        self.subscribe_error = Some(error);
        self
    }
}

#[async_trait]
impl Subscription for MockSubscription {
    fn subscribe(
        &mut self,
        topic: &str,
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<(), SubscriptionError> {
        if let Some(e) = self.subscribe_error.take() {
            return Err(e);
        }
        self.state.lock().subscribed.push(topic.to_owned());
        self.listener = Some(listener);
        Ok(())
    }

    async fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ConsumedMessage>, SubscriptionError> {
        self.state.lock().polls += 1;

        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Message(message) => return Ok(Some(message)),
                Step::Assign(partitions) => {
                    if let Some(listener) = &self.listener {
                        listener.partitions_assigned(&partitions);
                    }
                }
                Step::Revoke(partitions) => {
                    if let Some(listener) = &self.listener {
                        listener.partitions_revoked(&partitions);
                    }
                }
                Step::Idle => {
                    tokio::time::sleep(timeout).await;
                    return Ok(None);
                }
                Step::Error(e) => return Err(e),
                Step::Hook(f) => f(),
            }
        }

        if let Some(controller) = &self.stop_when_exhausted {
            controller.trigger();
        }
        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    fn commit(&self, offsets: &[PartitionOffset]) -> Result<(), SubscriptionError> {
        let mut state = self.state.lock();
        if state.fail_commits {
            return Err(SubscriptionError::Kafka(KafkaError::ConsumerCommit(
                RDKafkaErrorCode::RebalanceInProgress,
            )));
        }
        state.commits.push(offsets.to_vec());
        Ok(())
    }

    fn close(self) {
        self.state.lock().closes += 1;
    }
}

/// Counts handled messages and fails for the offsets it is told to.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    handled: Arc<Mutex<Vec<(Partition, i64)>>>,
    failing_offsets: Arc<Mutex<Vec<i64>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(self, offsets: &[i64]) -> Self {
        self.failing_offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(offsets);
        self
    }

    pub fn handled(&self) -> Vec<(Partition, i64)> {
        self.handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, message: &ConsumedMessage) -> anyhow::Result<()> {
        self.handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((message.partition().clone(), message.offset()));

        let fails = self
            .failing_offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&message.offset());
        if fails {
            anyhow::bail!("handler rejected offset {}", message.offset());
        }
        Ok(())
    }
}

/// Blocks on the offsets it gates until [`GatedHandler::release`] is called.
/// A release that happens first is remembered.
#[derive(Clone, Default)]
pub struct GatedHandler {
    gated_offsets: Arc<Vec<i64>>,
    gate: Arc<Notify>,
    completed: Arc<AtomicUsize>,
}

impl GatedHandler {
    pub fn new(gated_offsets: Vec<i64>) -> Self {
        Self {
            gated_offsets: Arc::new(gated_offsets),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for GatedHandler {
    async fn handle(&self, message: &ConsumedMessage) -> anyhow::Result<()> {
        if self.gated_offsets.contains(&message.offset()) {
            self.gate.notified().await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A counter usable as an error observer or close handler.
#[derive(Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl crate::hooks::ErrorObserver for CallCounter {
    fn observe(&self, _message: &ConsumedMessage, _error: &anyhow::Error) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl crate::hooks::CloseHandler for CallCounter {
    fn on_close(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
