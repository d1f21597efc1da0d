//! A partitioned Kafka consumption loop.
//!
//! A [`Looper`](looper::Looper) polls one topic as a member of a consumer
//! group, runs a caller-supplied handler for every message on its own task and
//! commits offsets in batches. Each batch ends in a barrier: polling stops
//! until every dispatched message is done, then the highest completed offset
//! of every partition is committed. Rebalances start a new generation, and
//! work from an older generation never reaches a commit.
//!
//! ## Error logging (anyhow)
//!
//! Handler errors are `anyhow::Error`. Log them with `{e:#}` or `error = ?e`
//! so the whole cause chain shows up.

pub mod config;
pub mod error;
pub mod hooks;
pub mod kafka;
pub mod ledger;
pub mod looper;
pub mod metrics;
pub mod metrics_consts;
pub mod rebalance;
pub mod shutdown;
pub mod subscription;
pub mod test_utils;

pub use config::{Config, LooperSettings};
pub use error::{ConfigError, LooperError, SubscriptionError};
pub use hooks::{CloseHandler, ErrorObserver, EventHandler, Filter};
pub use looper::{Looper, LooperBuilder};
pub use shutdown::ShutdownController;
pub use subscription::Subscription;
