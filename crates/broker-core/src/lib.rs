//! Wires storage, dispatch, projections, authentication, and authorization
//! into a running broker: [`Broker::bootstrap`] seeds the control plane on
//! first start and returns every component a caller needs, already wired.

mod api_key_cache;
mod bootstrap;
mod error;
mod publish_pipeline;

pub use api_key_cache::ApiKeyCache;
pub use bootstrap::Broker;
pub use error::BrokerError;
pub use publish_pipeline::{ProjectionState, PublishPipeline};
