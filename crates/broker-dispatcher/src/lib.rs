//! Per-topic delivery actors: tick-or-nudge wakeups, bounded concurrent
//! fan-out to distinct consumers, retry via `broker-retry`, and consumer
//! removal once a batch's retry budget is exhausted.

mod consumer_registry;
mod dispatcher;
mod error;

pub use consumer_registry::ConsumerRegistry;
pub use dispatcher::{DispatcherConfig, DispatcherSupervisor};
pub use error::DispatchError;
