//! Persistent consumer records, cached in memory, guarded per-consumer so a
//! cursor advance from a delivery never races a subscribe/unsubscribe call.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use broker_store::TopicRegistry;
use broker_types::{Consumer, ConsumerTransport, EventId};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DispatchError;

pub struct ConsumerRegistry {
    config_root: PathBuf,
    cache: RwLock<HashMap<Uuid, Arc<RwLock<Consumer>>>>,
}

impl ConsumerRegistry {
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self { config_root: config_root.into(), cache: RwLock::new(HashMap::new()) }
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.config_root.join("consumers").join(format!("{id}.json"))
    }

    /// Loads every consumer record on disk into the cache. Called once at
    /// bootstrap so the dispatcher supervisor can start an actor per topic
    /// that already has subscribers.
    pub async fn load_all(&self) -> Result<Vec<Consumer>, DispatchError> {
        let dir = self.config_root.join("consumers");
        let mut loaded = Vec::new();
        let mut cache = self.cache.write().await;
        for stem in broker_fsutil::list_json_stems_sorted(&dir)? {
            let path = dir.join(format!("{stem}.json"));
            if let Some(consumer) = broker_fsutil::load_json::<Consumer>(&path)? {
                loaded.push(consumer.clone());
                cache.insert(consumer.id, Arc::new(RwLock::new(consumer)));
            }
        }
        Ok(loaded)
    }

    /// Persists a new consumer after checking every topic it subscribes to
    /// exists, and resolving a `None` cursor to "tail at registration" (the
    /// topic's current sequence) rather than leaving it to mean "from the
    /// start of the log".
    pub async fn register(&self, topics: &TopicRegistry, tenant: &str, namespace: &str, mut consumer: Consumer) -> Result<Consumer, DispatchError> {
        for (topic_name, cursor) in consumer.topics.iter_mut() {
            let entry = topics.get(tenant, namespace, topic_name).await?;
            if cursor.is_none() {
                let tail_sequence = entry.lock().await.config.sequence;
                *cursor = Some(EventId::new(tenant, namespace, topic_name, tail_sequence).encode());
            }
        }

        broker_fsutil::save_json(&self.path(consumer.id), &consumer)?;
        self.cache.write().await.insert(consumer.id, Arc::new(RwLock::new(consumer.clone())));
        Ok(consumer)
    }

    /// Mutates an existing consumer's transport, subscribed topics, or
    /// correlation id. `None` leaves a field unchanged; passing a topics map
    /// replaces the full subscription set, with the same existence check and
    /// tail-at-addition resolution `register` applies to a brand-new topic
    /// (one not already present in the consumer's current subscriptions).
    pub async fn update(
        &self,
        topics: &TopicRegistry,
        tenant: &str,
        namespace: &str,
        id: Uuid,
        transport: Option<ConsumerTransport>,
        new_topics: Option<BTreeMap<String, Option<String>>>,
        correlation_id: Option<Option<Uuid>>,
    ) -> Result<Consumer, DispatchError> {
        let entry = self.get(id).await?;
        let mut guard = entry.write().await;

        if let Some(transport) = transport {
            guard.transport = transport;
        }
        if let Some(correlation_id) = correlation_id {
            guard.correlation_id = correlation_id;
        }
        if let Some(mut new_topics) = new_topics {
            for (topic_name, cursor) in new_topics.iter_mut() {
                let entry = topics.get(tenant, namespace, topic_name).await?;
                let newly_added = !guard.topics.contains_key(topic_name);
                if cursor.is_none() && newly_added {
                    let tail_sequence = entry.lock().await.config.sequence;
                    *cursor = Some(EventId::new(tenant, namespace, topic_name, tail_sequence).encode());
                }
            }
            guard.topics = new_topics;
        }

        broker_fsutil::save_json(&self.path(id), &*guard)?;
        Ok(guard.clone())
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<RwLock<Consumer>>, DispatchError> {
        self.cache.read().await.get(&id).cloned().ok_or(DispatchError::ConsumerNotFound { id })
    }

    /// Snapshot of every consumer currently subscribed to `topic`, taken
    /// under each consumer's own lock so a concurrent unsubscribe doesn't
    /// tear a read in progress.
    pub async fn list_for_topic(&self, topic: &str) -> Vec<Arc<RwLock<Consumer>>> {
        let cache = self.cache.read().await;
        let mut matching = Vec::new();
        for entry in cache.values() {
            if entry.read().await.topics.contains_key(topic) {
                matching.push(entry.clone());
            }
        }
        matching
    }

    /// Records the id of the last event successfully delivered to `id` on
    /// `topic`, persisting the updated cursor to disk.
    pub async fn advance_cursor(&self, id: Uuid, topic: &str, last_event_id: &str) -> Result<(), DispatchError> {
        let entry = self.get(id).await?;
        let mut guard = entry.write().await;
        guard.topics.insert(topic.to_string(), Some(last_event_id.to_string()));
        guard.last_delivery_at = Some(chrono::Utc::now());
        broker_fsutil::save_json(&self.path(id), &*guard)?;
        Ok(())
    }

    /// Drops a consumer after its retry budget for a batch is exhausted
    /// (exhaustion removes the consumer, it does not retry forever).
    pub async fn remove(&self, id: Uuid) -> Result<(), DispatchError> {
        broker_fsutil::delete_file(&self.path(id))?;
        self.cache.write().await.remove(&id);
        Ok(())
    }

    pub fn callback_of(consumer: &Consumer) -> &str {
        match &consumer.transport {
            ConsumerTransport::Http { callback } => callback,
            ConsumerTransport::InMemory { handler_id } => handler_id,
        }
    }
}
