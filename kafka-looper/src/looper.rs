//! The poll loop.
//!
//! One control task polls the subscription and hands every message to its own
//! worker task. After every `num_per_commit` dispatches the loop stops polling,
//! waits for the whole batch to finish and commits the ledger, so at most
//! `num_per_commit` workers are ever outstanding and nothing is committed
//! before it has been processed.
//!
//! Workers carry the generation that was current when their message was
//! polled. A rebalance in between makes their completion, and the batch
//! commit, stale; see [`RebalanceTracker`].

use std::sync::Arc;
use std::time::Instant;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::LooperSettings;
use crate::error::{ConfigError, LooperError};
use crate::hooks::{CloseHandler, ErrorObserver, EventHandler, Filter, Hooks};
use crate::kafka::message::ConsumedMessage;
use crate::metrics_consts::{
    LOOPER_BARRIER_WAIT_MS, LOOPER_IN_FLIGHT_WORKERS, LOOPER_MESSAGES_RECEIVED, LOOPER_POLL_ERRORS,
    OFFSET_COMMITS, OFFSET_COMMIT_PARTITIONS, WORKER_HANDLER_ERRORS, WORKER_MESSAGES_FILTERED,
    WORKER_PANICS,
};
use crate::rebalance::RebalanceTracker;
use crate::shutdown::ShutdownController;
use crate::subscription::Subscription;

pub struct LooperBuilder {
    topic: String,
    group: Option<String>,
    settings: LooperSettings,
    handler: Option<Arc<dyn EventHandler>>,
    filter: Option<Arc<dyn Filter>>,
    error_observer: Option<Arc<dyn ErrorObserver>>,
    close_handler: Option<Arc<dyn CloseHandler>>,
    shutdown: ShutdownController,
    trap_signals: bool,
    span: Option<Span>,
}

impl LooperBuilder {
    pub fn new(topic: impl Into<String>, settings: LooperSettings) -> Self {
        Self {
            topic: topic.into(),
            group: None,
            settings,
            handler: None,
            filter: None,
            error_observer: None,
            close_handler: None,
            shutdown: ShutdownController::new(),
            trap_signals: true,
            span: None,
        }
    }

    pub fn event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn error_observer(mut self, observer: impl ErrorObserver + 'static) -> Self {
        self.error_observer = Some(Arc::new(observer));
        self
    }

    pub fn close_handler(mut self, handler: impl CloseHandler + 'static) -> Self {
        self.close_handler = Some(Arc::new(handler));
        self
    }

    /// Consumer group recorded on the default span.
    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Share a shutdown controller with the rest of the process.
    pub fn shutdown(mut self, controller: ShutdownController) -> Self {
        self.shutdown = controller;
        self
    }

    /// Whether `run` installs SIGINT/SIGTERM handlers. On by default.
    pub fn trap_signals(mut self, enabled: bool) -> Self {
        self.trap_signals = enabled;
        self
    }

    /// Span every log line of the loop and its workers is recorded under.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Assemble the loop around `subscription`. Nothing talks to the broker
    /// until [`Looper::run`].
    pub fn build<S: Subscription>(self, subscription: S) -> Result<Looper<S>, ConfigError> {
        if self.topic.is_empty() {
            return Err(ConfigError::MissingTopic);
        }
        let handler = self.handler.ok_or(ConfigError::MissingEventHandler)?;
        let span = self.span.unwrap_or_else(|| {
            info_span!(
                "looper",
                topic = %self.topic,
                group = self.group.as_deref().unwrap_or_default()
            )
        });

        Ok(Looper {
            subscription,
            topic: self.topic,
            settings: self.settings,
            hooks: Hooks {
                handler,
                filter: self.filter,
                error_observer: self.error_observer,
            },
            close_handler: self.close_handler,
            tracker: Arc::new(RebalanceTracker::new()),
            shutdown: self.shutdown,
            trap_signals: self.trap_signals,
            span,
            dispatched: 0,
            in_flight: JoinSet::new(),
        })
    }
}

pub struct Looper<S> {
    subscription: S,
    topic: String,
    settings: LooperSettings,
    hooks: Hooks,
    close_handler: Option<Arc<dyn CloseHandler>>,
    tracker: Arc<RebalanceTracker>,
    shutdown: ShutdownController,
    trap_signals: bool,
    span: Span,
    dispatched: u64,
    in_flight: JoinSet<()>,
}

impl<S: Subscription> Looper<S> {
    pub fn builder(topic: impl Into<String>, settings: LooperSettings) -> LooperBuilder {
        LooperBuilder::new(topic, settings)
    }

    pub fn tracker(&self) -> Arc<RebalanceTracker> {
        self.tracker.clone()
    }

    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Subscribe and poll until shutdown is requested or something fatal
    /// happens. The subscription is closed, and the close handler called,
    /// exactly once on every path that got past subscribing.
    pub async fn run(self) -> Result<(), LooperError> {
        let span = self.span.clone();
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) -> Result<(), LooperError> {
        let signals = if self.trap_signals {
            Some(self.shutdown.trap_signals()?)
        } else {
            None
        };

        let listener = self.tracker.clone();
        if let Err(source) = self.subscription.subscribe(&self.topic, listener) {
            error!("failed to subscribe to {}: {source}", self.topic);
            self.shutdown.trigger();
            return Err(LooperError::Subscribe {
                topic: self.topic,
                source,
            });
        }
        info!(
            num_per_commit = self.settings.num_per_commit(),
            workers = self.settings.workers(),
            "Subscribed to {}",
            self.topic
        );

        let outcome = self.poll_loop().await;
        self.stop(signals);
        outcome
    }

    async fn poll_loop(&mut self) -> Result<(), LooperError> {
        let per_commit = self.settings.num_per_commit() as u64;

        loop {
            if self.shutdown.is_triggered() {
                info!(
                    dispatched = self.dispatched,
                    "Shutdown requested, leaving poll loop"
                );
                return Ok(());
            }

            let polled = self.subscription.poll(self.settings.poll_timeout()).await;
            // Read after the poll: an assignment delivered during it already
            // counts for the message it returned.
            let generation = self.tracker.current_generation();

            match polled {
                Ok(None) => debug!("Heartbeat"),
                Ok(Some(message)) => {
                    self.dispatch(message, generation);
                    if self.dispatched % per_commit == 0 {
                        self.wait_for_batch().await;
                        info!(dispatched = self.dispatched, "Batch complete");
                        self.commit(generation)?;
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("Fatal error while polling: {e}");
                    metrics::counter!(LOOPER_POLL_ERRORS, "kind" => "fatal").increment(1);
                    return Err(LooperError::Poll(e));
                }
                Err(e) => {
                    warn!("Error while polling, retrying: {e}");
                    metrics::counter!(LOOPER_POLL_ERRORS, "kind" => "transient").increment(1);
                    tokio::time::sleep(self.settings.poll_timeout()).await;
                }
            }
        }
    }

    fn dispatch(&mut self, message: ConsumedMessage, generation: u64) {
        self.dispatched += 1;
        metrics::counter!(LOOPER_MESSAGES_RECEIVED).increment(1);
        debug!(
            partition = %message.partition(),
            offset = message.offset(),
            generation,
            "Dispatching message"
        );

        let worker = process_message(
            self.hooks.clone(),
            self.tracker.clone(),
            message,
            generation,
        );
        self.in_flight.spawn(worker.instrument(self.span.clone()));
        metrics::gauge!(LOOPER_IN_FLIGHT_WORKERS).set(self.in_flight.len() as f64);
    }

    /// The commit barrier: no poll happens until every worker of the batch
    /// has finished.
    async fn wait_for_batch(&mut self) {
        let started = Instant::now();
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                // The worker died before recording its offset
                error!("Worker task failed: {e}");
                metrics::counter!(WORKER_PANICS).increment(1);
            }
        }
        metrics::histogram!(LOOPER_BARRIER_WAIT_MS).record(started.elapsed().as_millis() as f64);
        metrics::gauge!(LOOPER_IN_FLIGHT_WORKERS).set(0.0);
    }

    fn commit(&self, generation: u64) -> Result<(), LooperError> {
        let Some(offsets) = self.tracker.committable(generation) else {
            return Ok(());
        };

        match self.subscription.commit(&offsets) {
            Ok(()) => {
                debug!(generation, "Committed offsets: {:?}", offsets);
                metrics::counter!(OFFSET_COMMITS, "status" => "success").increment(1);
                metrics::gauge!(OFFSET_COMMIT_PARTITIONS).set(offsets.len() as f64);
                Ok(())
            }
            Err(e) => {
                error!("Failed to commit offsets: {e}");
                metrics::counter!(OFFSET_COMMITS, "status" => "failure").increment(1);
                Err(LooperError::Commit(e))
            }
        }
    }

    fn stop(self, signals: Option<JoinHandle<()>>) {
        let Looper {
            subscription,
            close_handler,
            shutdown,
            mut in_flight,
            ..
        } = self;

        if !in_flight.is_empty() {
            warn!(
                abandoned = in_flight.len(),
                "Stopping with workers still running; their offsets will not be committed"
            );
        }
        in_flight.detach_all();

        if let Some(handler) = close_handler {
            handler.on_close();
        }
        subscription.close();

        // Lets the signal task exit if no signal ever arrived
        shutdown.trigger();
        drop(signals);
        info!("Looper stopped");
    }
}

async fn process_message(
    hooks: Hooks,
    tracker: Arc<RebalanceTracker>,
    message: ConsumedMessage,
    generation: u64,
) {
    if hooks.accepts(&message) {
        if let Err(e) = hooks.handler.handle(&message).await {
            metrics::counter!(WORKER_HANDLER_ERRORS).increment(1);
            match &hooks.error_observer {
                Some(observer) => observer.observe(&message, &e),
                None => debug!(
                    partition = %message.partition(),
                    offset = message.offset(),
                    "Event handler failed: {e:#}"
                ),
            }
        }
    } else {
        metrics::counter!(WORKER_MESSAGES_FILTERED).increment(1);
    }

    tracker.record_completion(generation, message.partition(), message.next_offset());
}
