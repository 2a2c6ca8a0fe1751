//! Ties schema validation, sequence assignment, and durable write
//! (`EventStore::publish_topic_batch`) to a synchronous read-your-writes
//! projection update for the management topics, then nudges the topic's
//! dispatcher so subscribers see the new tail without waiting for a tick.

use std::collections::HashMap;
use std::sync::Arc;

use broker_dispatcher::DispatcherSupervisor;
use broker_projections::{API_KEYS_TOPIC, MANAGEMENT_NAMESPACE, Projections, SYSTEM_TENANT, reconcile};
use broker_store::{EventStore, PublishRequest, TopicRegistry};
use tokio::sync::RwLock;

use crate::api_key_cache::ApiKeyCache;
use crate::error::BrokerError;

/// Replay progress alongside the projections it was built from, so
/// reconciliation after a publish only re-reads the new tail.
#[derive(Default)]
pub struct ProjectionState {
    pub projections: Projections,
    last_applied: HashMap<String, u64>,
}

impl ProjectionState {
    pub fn new(projections: Projections, last_applied: HashMap<String, u64>) -> Self {
        Self { projections, last_applied }
    }
}

pub struct PublishPipeline {
    store: Arc<EventStore>,
    topics: Arc<TopicRegistry>,
    dispatcher: Arc<DispatcherSupervisor>,
    projections: Arc<RwLock<ProjectionState>>,
    api_keys: Arc<ApiKeyCache>,
}

impl PublishPipeline {
    pub fn new(
        store: Arc<EventStore>,
        topics: Arc<TopicRegistry>,
        dispatcher: Arc<DispatcherSupervisor>,
        projections: Arc<RwLock<ProjectionState>>,
        api_keys: Arc<ApiKeyCache>,
    ) -> Self {
        Self { store, topics, dispatcher, projections, api_keys }
    }

    /// Writes `requests` (all against the same topic) and, for a management
    /// topic, folds the newly written events into the projection before
    /// returning — a caller that reads projections right after `publish`
    /// sees its own write. A publish to the `api-keys` topic also refreshes
    /// the API-key lookup cache, so a key created or revoked at runtime is
    /// honored by the very next authentication attempt rather than only
    /// after a restart.
    pub async fn publish(
        &self,
        tenant: &str,
        namespace: &str,
        topic: &str,
        requests: &[PublishRequest],
    ) -> Result<Vec<String>, BrokerError> {
        let ids = self.store.publish_topic_batch(&self.topics, tenant, namespace, topic, requests).await?;

        if tenant == SYSTEM_TENANT && namespace == MANAGEMENT_NAMESPACE {
            let mut state = self.projections.write().await;
            let last_applied = state.last_applied.get(topic).copied().unwrap_or(0);
            let highest = reconcile(&self.store, &mut state.projections, topic, last_applied);
            state.last_applied.insert(topic.to_string(), highest);

            if topic == API_KEYS_TOPIC {
                self.api_keys.refresh(&state.projections);
            }
        }

        self.dispatcher.nudge(tenant, namespace, topic).await;
        Ok(ids)
    }
}
