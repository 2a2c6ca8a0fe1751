//! Durable event storage: the append-only per-topic log (`EventStore`) and
//! the topic configuration registry (`TopicRegistry`) that backs it.

mod error;
mod event_store;
mod registry;

pub use error::StoreError;
pub use event_store::{EventStore, PublishRequest, MAX_PAYLOAD_BYTES};
pub use registry::{TopicEntry, TopicRegistry};
