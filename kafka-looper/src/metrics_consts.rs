// ==== Poll loop metrics ====
/// Counter for messages delivered by poll and dispatched to a worker
pub const LOOPER_MESSAGES_RECEIVED: &str = "looper_messages_received_total";

/// Counter for poll errors, labelled by severity
pub const LOOPER_POLL_ERRORS: &str = "looper_poll_errors_total";

/// Histogram for how long the commit barrier waited on in-flight workers
pub const LOOPER_BARRIER_WAIT_MS: &str = "looper_barrier_wait_ms";

/// Gauge for the number of workers dispatched since the last barrier
pub const LOOPER_IN_FLIGHT_WORKERS: &str = "looper_in_flight_workers";

// ==== Worker metrics ====
/// Counter for messages the filter rejected
pub const WORKER_MESSAGES_FILTERED: &str = "looper_worker_messages_filtered_total";

/// Counter for event handler errors
pub const WORKER_HANDLER_ERRORS: &str = "looper_worker_handler_errors_total";

/// Counter for worker tasks that panicked before completing
pub const WORKER_PANICS: &str = "looper_worker_panics_total";

/// Counter for completions discarded because the generation moved on
pub const WORKER_STALE_COMPLETIONS: &str = "looper_worker_stale_completions_total";

// ==== Rebalance / commit metrics ====
/// Counter for rebalance notifications, labelled by event type
pub const REBALANCE_EVENTS: &str = "looper_rebalance_events_total";

/// Gauge for the current generation
pub const REBALANCE_GENERATION: &str = "looper_rebalance_generation";

/// Counter for commit attempts, labelled by outcome
pub const OFFSET_COMMITS: &str = "looper_offset_commits_total";

/// Gauge for partitions included in the last successful commit
pub const OFFSET_COMMIT_PARTITIONS: &str = "looper_offset_commit_partitions";
