//! Append-only per-topic event log on the filesystem.
//!
//! Layout: `<dataRoot>/<tenant>/<namespace>/<topic>/<date>/<bucket>/<seq>.json`,
//! where `bucket` groups 1000 sequences per directory so no single directory
//! grows without bound.

use std::path::PathBuf;

use broker_types::Event;
use chrono::Utc;

use crate::error::StoreError;
use crate::registry::TopicRegistry;

pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
const BUCKET_SIZE: u64 = 1000;

/// One event to append, prior to sequence assignment.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub tenant: String,
    pub namespace: String,
    pub topic: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

pub struct EventStore {
    data_root: PathBuf,
}

impl EventStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self { data_root: data_root.into() }
    }

    fn topic_dir(&self, tenant: &str, namespace: &str, topic: &str) -> PathBuf {
        self.data_root.join(tenant).join(namespace).join(topic)
    }

    fn bucket_name(sequence: u64) -> String {
        format!("{:04}", (sequence.saturating_sub(1)) / BUCKET_SIZE)
    }

    fn file_stem(sequence: u64) -> String {
        format!("{sequence:010}")
    }

    /// Publishes a batch of requests, all against the same topic, under that
    /// topic's exclusive lock. Events already written before a mid-batch
    /// failure remain durable; their ids are part of the returned prefix.
    pub async fn publish_topic_batch(
        &self,
        registry: &TopicRegistry,
        tenant: &str,
        namespace: &str,
        topic: &str,
        requests: &[PublishRequest],
    ) -> Result<Vec<String>, StoreError> {
        let entry = registry.get(tenant, namespace, topic).await?;
        let mut guard = entry.lock().await;

        let mut assigned_ids = Vec::with_capacity(requests.len());
        for request in requests {
            let payload_len = serde_json::to_vec(&request.payload).map(|v| v.len()).unwrap_or(0);
            if payload_len > MAX_PAYLOAD_BYTES {
                return Err(StoreError::PayloadTooLarge { size: payload_len, limit: MAX_PAYLOAD_BYTES });
            }

            let schema = guard.schemas.get(&request.event_type).ok_or_else(|| StoreError::SchemaNotFound {
                topic: topic.to_string(),
                event_type: request.event_type.clone(),
            })?;
            schema.validate(&request.payload)?;

            let sequence = guard.config.sequence + 1;
            let id = broker_types::EventId::new(tenant, namespace, topic, sequence).encode();
            let event = Event {
                id: id.clone(),
                timestamp: Utc::now(),
                event_type: request.event_type.clone(),
                payload: request.payload.clone(),
            };

            let path = self.event_path(tenant, namespace, topic, sequence);
            let bytes = serde_json::to_vec_pretty(&event).map_err(|e| StoreError::Io(e.into()))?;
            broker_fsutil::write_atomic_create_new(&path, &bytes).map_err(StoreError::Io)?;

            guard.config.sequence = sequence;
            registry.persist(tenant, namespace, topic, &guard.config).await?;

            assigned_ids.push(id);
        }

        Ok(assigned_ids)
    }

    fn event_path(&self, tenant: &str, namespace: &str, topic: &str, sequence: u64) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        self.topic_dir(tenant, namespace, topic)
            .join(date)
            .join(Self::bucket_name(sequence))
            .join(format!("{}.json", Self::file_stem(sequence)))
    }

    /// All events for a topic with sequence strictly greater than
    /// `after_sequence`, walking date directories in order, optionally
    /// capped at `limit`.
    pub fn read_since(
        &self,
        tenant: &str,
        namespace: &str,
        topic: &str,
        after_sequence: u64,
        limit: Option<usize>,
    ) -> Result<Vec<Event>, StoreError> {
        let topic_dir = self.topic_dir(tenant, namespace, topic);
        let mut events = Vec::new();

        for date in broker_fsutil::list_dir_names_sorted(&topic_dir).map_err(StoreError::Io)? {
            let date_dir = topic_dir.join(&date);
            for bucket in broker_fsutil::list_dir_names_sorted(&date_dir).map_err(StoreError::Io)? {
                let bucket_dir = date_dir.join(&bucket);
                for stem in broker_fsutil::list_json_stems_sorted(&bucket_dir).map_err(StoreError::Io)? {
                    let sequence: u64 = match stem.parse() {
                        Ok(s) => s,
                        Err(_) => continue,
                    };
                    if sequence <= after_sequence {
                        continue;
                    }
                    if let Some(event) = self.load_event(&bucket_dir, &stem)? {
                        events.push(event);
                    }
                    if limit.is_some_and(|l| events.len() >= l) {
                        return Ok(events);
                    }
                }
            }
        }
        Ok(events)
    }

    /// All events for a topic published on a given `YYYY-MM-DD` date.
    pub fn read_by_date(
        &self,
        tenant: &str,
        namespace: &str,
        topic: &str,
        date: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Event>, StoreError> {
        let date_dir = self.topic_dir(tenant, namespace, topic).join(date);
        let mut events = Vec::new();
        for bucket in broker_fsutil::list_dir_names_sorted(&date_dir).map_err(StoreError::Io)? {
            let bucket_dir = date_dir.join(&bucket);
            for stem in broker_fsutil::list_json_stems_sorted(&bucket_dir).map_err(StoreError::Io)? {
                if let Some(event) = self.load_event(&bucket_dir, &stem)? {
                    events.push(event);
                }
                if limit.is_some_and(|l| events.len() >= l) {
                    return Ok(events);
                }
            }
        }
        Ok(events)
    }

    /// Looks up a single event by its decoded id. Scans date directories in
    /// order since sequence alone does not determine which date bucket an
    /// event landed in.
    pub fn read_by_id(&self, tenant: &str, namespace: &str, topic: &str, sequence: u64) -> Result<Option<Event>, StoreError> {
        let topic_dir = self.topic_dir(tenant, namespace, topic);
        let bucket = Self::bucket_name(sequence);
        let stem = Self::file_stem(sequence);
        for date in broker_fsutil::list_dir_names_sorted(&topic_dir).map_err(StoreError::Io)? {
            let bucket_dir = topic_dir.join(&date).join(&bucket);
            if let Some(event) = self.load_event(&bucket_dir, &stem)? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn load_event(&self, bucket_dir: &std::path::Path, stem: &str) -> Result<Option<Event>, StoreError> {
        let path = bucket_dir.join(format!("{stem}.json"));
        broker_fsutil::load_json(&path).map_err(StoreError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_types::TopicSchema;
    use serde_json::json;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn amount_schema() -> serde_json::Value {
        json!({"type": "object", "required": ["amount"], "properties": {"amount": {"type": "number"}}})
    }

    async fn seeded(dir: &std::path::Path) -> (EventStore, TopicRegistry) {
        let registry = TopicRegistry::new(dir.join("config"));
        let store = EventStore::new(dir.join("data"));
        let schemas = vec![TopicSchema { event_type: "invoice.created".into(), schema: amount_schema() }];
        registry.create(Uuid::new_v4(), Uuid::new_v4(), "acme", "billing", "invoices", schemas).await.expect("create");
        (store, registry)
    }

    #[tokio::test]
    async fn publish_assigns_monotonic_sequence() {
        let dir = tempdir().expect("tempdir");
        let (store, registry) = seeded(dir.path()).await;

        let requests = vec![
            PublishRequest { tenant: "acme".into(), namespace: "billing".into(), topic: "invoices".into(), event_type: "invoice.created".into(), payload: json!({"amount": 10}) },
            PublishRequest { tenant: "acme".into(), namespace: "billing".into(), topic: "invoices".into(), event_type: "invoice.created".into(), payload: json!({"amount": 20}) },
        ];
        let ids = store.publish_topic_batch(&registry, "acme", "billing", "invoices", &requests).await.expect("publish");
        assert_eq!(ids.len(), 2);
        assert!(ids[0].ends_with("-1"));
        assert!(ids[1].ends_with("-2"));
    }

    #[tokio::test]
    async fn publish_rejects_unknown_event_type() {
        let dir = tempdir().expect("tempdir");
        let (store, registry) = seeded(dir.path()).await;

        let requests = vec![PublishRequest { tenant: "acme".into(), namespace: "billing".into(), topic: "invoices".into(), event_type: "invoice.voided".into(), payload: json!({}) }];
        let err = store.publish_topic_batch(&registry, "acme", "billing", "invoices", &requests).await.expect_err("should fail");
        assert!(matches!(err, StoreError::SchemaNotFound { .. }));
    }

    #[tokio::test]
    async fn publish_rejects_payload_failing_schema() {
        let dir = tempdir().expect("tempdir");
        let (store, registry) = seeded(dir.path()).await;

        let requests = vec![PublishRequest { tenant: "acme".into(), namespace: "billing".into(), topic: "invoices".into(), event_type: "invoice.created".into(), payload: json!({}) }];
        let err = store.publish_topic_batch(&registry, "acme", "billing", "invoices", &requests).await.expect_err("should fail");
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[tokio::test]
    async fn read_since_returns_events_after_cursor() {
        let dir = tempdir().expect("tempdir");
        let (store, registry) = seeded(dir.path()).await;

        let requests: Vec<_> = (0..5)
            .map(|n| PublishRequest { tenant: "acme".into(), namespace: "billing".into(), topic: "invoices".into(), event_type: "invoice.created".into(), payload: json!({"amount": n}) })
            .collect();
        store.publish_topic_batch(&registry, "acme", "billing", "invoices", &requests).await.expect("publish");

        let events = store.read_since("acme", "billing", "invoices", 2, None).expect("read");
        assert_eq!(events.len(), 3);
        assert!(events[0].id.ends_with("-3"));
    }

    #[tokio::test]
    async fn read_since_honors_limit() {
        let dir = tempdir().expect("tempdir");
        let (store, registry) = seeded(dir.path()).await;
        let requests: Vec<_> = (0..5)
            .map(|n| PublishRequest { tenant: "acme".into(), namespace: "billing".into(), topic: "invoices".into(), event_type: "invoice.created".into(), payload: json!({"amount": n}) })
            .collect();
        store.publish_topic_batch(&registry, "acme", "billing", "invoices", &requests).await.expect("publish");

        let events = store.read_since("acme", "billing", "invoices", 0, Some(2)).expect("read");
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn read_by_id_finds_published_event() {
        let dir = tempdir().expect("tempdir");
        let (store, registry) = seeded(dir.path()).await;
        let requests = vec![PublishRequest { tenant: "acme".into(), namespace: "billing".into(), topic: "invoices".into(), event_type: "invoice.created".into(), payload: json!({"amount": 5}) }];
        store.publish_topic_batch(&registry, "acme", "billing", "invoices", &requests).await.expect("publish");

        let found = store.read_by_id("acme", "billing", "invoices", 1).expect("read").expect("some");
        assert_eq!(found.payload["amount"], 5);
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let (store, registry) = seeded(dir.path()).await;
        let huge = "x".repeat(MAX_PAYLOAD_BYTES + 1);
        let requests = vec![PublishRequest { tenant: "acme".into(), namespace: "billing".into(), topic: "invoices".into(), event_type: "invoice.created".into(), payload: json!({"amount": 1, "note": huge}) }];
        let err = store.publish_topic_batch(&registry, "acme", "billing", "invoices", &requests).await.expect_err("should fail");
        assert!(matches!(err, StoreError::PayloadTooLarge { .. }));
    }
}
