//! Persistent topic configuration, cached in memory with compiled schemas
//! attached, guarded by a per-topic lock so publish and schema updates never
//! interleave for the same topic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use broker_schema::SchemaSet;
use broker_types::{Topic, TopicSchema};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::StoreError;

type TopicKey = (String, String, String);

/// A cached topic: its persisted config plus the schemas compiled from it.
/// The surrounding `Mutex` is the per-topic exclusive lock the publish
/// pipeline and schema updates both take.
pub struct TopicEntry {
    pub config: Topic,
    pub schemas: SchemaSet,
}

pub struct TopicRegistry {
    config_root: PathBuf,
    cache: RwLock<HashMap<TopicKey, Arc<Mutex<TopicEntry>>>>,
}

impl TopicRegistry {
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self { config_root: config_root.into(), cache: RwLock::new(HashMap::new()) }
    }

    fn config_path(&self, tenant: &str, namespace: &str, name: &str) -> PathBuf {
        self.config_root.join(tenant).join(namespace).join(format!("{name}.json"))
    }

    /// Loads a topic entry into the cache from disk if it is not already
    /// cached. Returns `None` if no config file exists on disk either.
    async fn load(&self, tenant: &str, namespace: &str, name: &str) -> Result<Option<Arc<Mutex<TopicEntry>>>, StoreError> {
        let key: TopicKey = (tenant.to_string(), namespace.to_string(), name.to_string());
        if let Some(entry) = self.cache.read().await.get(&key) {
            return Ok(Some(entry.clone()));
        }

        let path = self.config_path(tenant, namespace, name);
        let config: Option<Topic> = broker_fsutil::load_json(&path).map_err(StoreError::Io)?;
        let Some(config) = config else { return Ok(None) };

        let schemas = SchemaSet::compile_all(
            config.schemas.iter().map(|s| (s.event_type.clone(), s.schema.clone())),
        )?;
        let entry = Arc::new(Mutex::new(TopicEntry { config, schemas }));
        self.cache.write().await.insert(key, entry.clone());
        Ok(Some(entry))
    }

    /// Returns the cached entry for a topic, loading it from disk on a cold
    /// cache. Fails `TOPIC_NOT_FOUND` if the topic was never created or has
    /// been soft-deleted.
    pub async fn get(&self, tenant: &str, namespace: &str, name: &str) -> Result<Arc<Mutex<TopicEntry>>, StoreError> {
        match self.load(tenant, namespace, name).await? {
            Some(entry) => {
                if entry.lock().await.config.is_deleted() {
                    return Err(StoreError::TopicNotFound {
                        tenant: tenant.to_string(),
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                    });
                }
                Ok(entry)
            }
            None => Err(StoreError::TopicNotFound {
                tenant: tenant.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }

    pub async fn create(
        &self,
        tenant_resource_id: Uuid,
        namespace_resource_id: Uuid,
        tenant: &str,
        namespace: &str,
        name: &str,
        schemas: Vec<TopicSchema>,
    ) -> Result<Topic, StoreError> {
        let key: TopicKey = (tenant.to_string(), namespace.to_string(), name.to_string());
        let mut cache = self.cache.write().await;
        if cache.contains_key(&key) || self.config_path(tenant, namespace, name).exists() {
            return Err(StoreError::TopicAlreadyExists {
                tenant: tenant.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }

        let compiled = SchemaSet::compile_all(schemas.iter().map(|s| (s.event_type.clone(), s.schema.clone())))?;
        let config = Topic {
            resource_id: Uuid::new_v4(),
            tenant_resource_id,
            namespace_resource_id,
            tenant: tenant.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            sequence: 0,
            schemas,
            deleted_at: None,
        };
        broker_fsutil::save_json(&self.config_path(tenant, namespace, name), &config).map_err(StoreError::Io)?;
        let entry = Arc::new(Mutex::new(TopicEntry { config: config.clone(), schemas: compiled }));
        cache.insert(key, entry);
        Ok(config)
    }

    /// Additive-only schema update: rejects removal of any previously
    /// registered event type, replaces schemas for event types that already
    /// existed, and adds any new ones.
    pub async fn update_schemas(
        &self,
        tenant: &str,
        namespace: &str,
        name: &str,
        desired: Vec<TopicSchema>,
    ) -> Result<Topic, StoreError> {
        let entry = self.get(tenant, namespace, name).await?;
        let mut guard = entry.lock().await;

        for existing in &guard.config.schemas {
            if !desired.iter().any(|d| d.event_type == existing.event_type) {
                return Err(StoreError::SchemaRemovalNotAllowed { event_type: existing.event_type.clone() });
            }
        }

        let compiled = SchemaSet::compile_all(desired.iter().map(|s| (s.event_type.clone(), s.schema.clone())))?;
        guard.config.schemas = desired;
        broker_fsutil::save_json(&self.config_path(tenant, namespace, name), &guard.config).map_err(StoreError::Io)?;
        guard.schemas = compiled;
        Ok(guard.config.clone())
    }

    pub async fn persist(&self, tenant: &str, namespace: &str, name: &str, config: &Topic) -> Result<(), StoreError> {
        broker_fsutil::save_json(&self.config_path(tenant, namespace, name), config).map_err(StoreError::Io)
    }
}
