//! Wires every crate into a running broker and seeds the reserved
//! `$system`/`$management` control plane on first start. Steps 1-2
//! publish with no schema or authorization check: there is no admin
//! principal yet to authorize against, and the schemas registered for the
//! five management topics in step 3 are deliberately permissive, so the
//! later call into `EventStore::publish_topic_batch` amounts to a no-op
//! validation rather than a bypassed one.

use std::collections::HashMap;
use std::sync::Arc;

use broker_auth::{AuthenticationGateway, hash_password};
use broker_authz::AuthorizationEngine;
use broker_config::BrokerConfig;
use broker_dispatcher::{ConsumerRegistry, DispatcherConfig, DispatcherSupervisor};
use broker_projections::{MANAGEMENT_NAMESPACE, MANAGEMENT_TOPICS, SYSTEM_TENANT, rebuild};
use broker_store::{EventStore, PublishRequest, TopicRegistry};
use broker_types::{Permission, PermissionGrant, PrincipalType, ResourceType, TopicSchema, UserStatus};
use broker_webhook::{DeliveryAdapter, HttpDeliveryAdapter};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api_key_cache::ApiKeyCache;
use crate::error::BrokerError;
use crate::publish_pipeline::{ProjectionState, PublishPipeline};

fn permissive_schema_for(topic: &str) -> Vec<TopicSchema> {
    let event_types: &[&str] = match topic {
        "tenants" => &["tenant.created", "tenant.updated", "tenant.deleted"],
        "namespaces" => &["namespace.created", "namespace.deleted"],
        "users" => &["user.created", "user.status.changed", "user.password.changed", "user.tenant.assigned", "user.tenant.removed"],
        "permissions" => &["permission.granted", "permission.revoked"],
        "api-keys" => &["api_key.created", "api_key.revoked"],
        _ => &[],
    };
    event_types.iter().map(|event_type| TopicSchema { event_type: (*event_type).to_string(), schema: serde_json::json!({"type": "object"}) }).collect()
}

/// Every wired component a running broker needs. Constructed once by
/// [`Broker::bootstrap`] and shared behind `Arc` rather than any global.
pub struct Broker {
    pub store: Arc<EventStore>,
    pub topics: Arc<TopicRegistry>,
    pub consumers: Arc<ConsumerRegistry>,
    pub dispatcher: Arc<DispatcherSupervisor>,
    pub projections: Arc<RwLock<ProjectionState>>,
    pub publish_pipeline: PublishPipeline,
    pub api_keys: Arc<ApiKeyCache>,
    pub auth: AuthenticationGateway<ApiKeyCache>,
    pub authz: AuthorizationEngine,
    pub system_tenant_id: Uuid,
    pub management_namespace_id: Uuid,
}

impl Broker {
    pub async fn bootstrap(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let admin_password = config.admin_password()?.to_string();

        let store = Arc::new(EventStore::new(&config.storage.data_root));
        let topics = Arc::new(TopicRegistry::new(&config.storage.config_root));
        let consumers = Arc::new(ConsumerRegistry::new(&config.storage.config_root));
        let adapter: Arc<dyn DeliveryAdapter> = Arc::new(HttpDeliveryAdapter::new());
        let dispatcher_config = DispatcherConfig {
            tick_interval: config.dispatcher.tick_interval(),
            fan_out: config.dispatcher.fan_out,
            batch_max: config.dispatcher.batch_max,
            ..DispatcherConfig::default()
        };
        let dispatcher = DispatcherSupervisor::new(store.clone(), consumers.clone(), adapter, dispatcher_config);

        // Initial replay, purely to check what already exists before seeding.
        let mut projections = rebuild(&store);

        // Resolve the tenant/namespace resource ids before registering the
        // management topics, so a topic's `tenant_resource_id`/
        // `namespace_resource_id` is correct on the very first bootstrap
        // instead of a throwaway id nothing ever points to again.
        let tenant_already_existed = projections.tenant_by_name(SYSTEM_TENANT).cloned();
        let system_tenant_id = tenant_already_existed.as_ref().map(|t| t.resource_id).unwrap_or_else(Uuid::new_v4);

        let namespace_already_existed = projections.namespace_by_name(system_tenant_id, MANAGEMENT_NAMESPACE).cloned();
        let management_namespace_id = namespace_already_existed.as_ref().map(|n| n.resource_id).unwrap_or_else(Uuid::new_v4);

        for topic in MANAGEMENT_TOPICS {
            match topics
                .create(system_tenant_id, management_namespace_id, SYSTEM_TENANT, MANAGEMENT_NAMESPACE, topic, permissive_schema_for(topic))
                .await
            {
                Ok(_) | Err(broker_store::StoreError::TopicAlreadyExists { .. }) => {}
                Err(other) => return Err(other.into()),
            }
        }

        let projections_state = Arc::new(RwLock::new(ProjectionState::default()));
        let api_keys = Arc::new(ApiKeyCache::new());
        let publish_pipeline =
            PublishPipeline::new(store.clone(), topics.clone(), dispatcher.clone(), projections_state.clone(), api_keys.clone());

        if tenant_already_existed.is_none() {
            publish_pipeline
                .publish(
                    SYSTEM_TENANT,
                    MANAGEMENT_NAMESPACE,
                    "tenants",
                    &[PublishRequest {
                        tenant: SYSTEM_TENANT.into(),
                        namespace: MANAGEMENT_NAMESPACE.into(),
                        topic: "tenants".into(),
                        event_type: "tenant.created".into(),
                        payload: serde_json::json!({"resourceId": system_tenant_id, "name": SYSTEM_TENANT}),
                    }],
                )
                .await?;
        }

        if namespace_already_existed.is_none() {
            publish_pipeline
                .publish(
                    SYSTEM_TENANT,
                    MANAGEMENT_NAMESPACE,
                    "namespaces",
                    &[PublishRequest {
                        tenant: SYSTEM_TENANT.into(),
                        namespace: MANAGEMENT_NAMESPACE.into(),
                        topic: "namespaces".into(),
                        event_type: "namespace.created".into(),
                        payload: serde_json::json!({"resourceId": management_namespace_id, "tenantResourceId": system_tenant_id, "name": MANAGEMENT_NAMESPACE}),
                    }],
                )
                .await?;
        }

        // Re-replay so the seeded tenant/namespace (if just published) are
        // visible for the admin-user check below; `publish` only keeps the
        // pipeline's own projection copy current, not this local one.
        projections = rebuild(&store);

        let has_active_admin = projections.user_by_email(&config.bootstrap.admin_email).is_some_and(|u| u.status == UserStatus::Active);
        if !has_active_admin {
            let user_id = Uuid::new_v4();
            let password_hash = hash_password(&admin_password)?;
            publish_pipeline
                .publish(
                    SYSTEM_TENANT,
                    MANAGEMENT_NAMESPACE,
                    "users",
                    &[PublishRequest {
                        tenant: SYSTEM_TENANT.into(),
                        namespace: MANAGEMENT_NAMESPACE.into(),
                        topic: "users".into(),
                        event_type: "user.created".into(),
                        payload: serde_json::json!({
                            "id": user_id,
                            "email": config.bootstrap.admin_email,
                            "passwordHash": password_hash,
                            "status": "ACTIVE",
                            "primaryTenantId": system_tenant_id,
                        }),
                    }],
                )
                .await?;

            let grant = PermissionGrant {
                principal_id: user_id,
                principal_type: PrincipalType::User,
                resource_type: ResourceType::Tenant,
                resource_id: Some(system_tenant_id),
                tenant_resource_id: system_tenant_id,
                namespace_resource_id: None,
                topic_resource_id: None,
                permissions: std::iter::once(Permission::Admin).collect(),
                constraints: None,
                expires_at: None,
            };
            publish_pipeline
                .publish(
                    SYSTEM_TENANT,
                    MANAGEMENT_NAMESPACE,
                    "permissions",
                    &[PublishRequest {
                        tenant: SYSTEM_TENANT.into(),
                        namespace: MANAGEMENT_NAMESPACE.into(),
                        topic: "permissions".into(),
                        event_type: "permission.granted".into(),
                        payload: serde_json::to_value(&grant).map_err(|e| BrokerError::Io(e.into()))?,
                    }],
                )
                .await?;
        }

        // Full, authoritative replay now that seeding is done.
        let final_projections = rebuild(&store);
        let last_applied: HashMap<String, u64> = MANAGEMENT_TOPICS
            .iter()
            .map(|topic| {
                let highest = store.read_since(SYSTEM_TENANT, MANAGEMENT_NAMESPACE, topic, 0, None).map(|events| {
                    events.iter().rev().find_map(|e| broker_types::EventId::parse(&e.id).ok()).map(|id| id.sequence).unwrap_or(0)
                });
                (topic.to_string(), highest.unwrap_or(0))
            })
            .collect();

        api_keys.refresh(&final_projections);
        {
            let mut state = projections_state.write().await;
            *state = ProjectionState::new(final_projections, last_applied);
        }

        let subscribed_topics: std::collections::HashSet<String> =
            consumers.load_all().await?.into_iter().flat_map(|c| c.topics.into_keys()).collect();
        for (tenant, namespace, topic) in discover_registered_topics(&config.storage.config_root)? {
            if subscribed_topics.contains(&topic) {
                dispatcher.ensure_running(&tenant, &namespace, &topic).await;
            }
        }

        let auth = AuthenticationGateway::new(api_keys.clone());
        let authz = AuthorizationEngine::new();

        Ok(Self {
            store,
            topics,
            consumers,
            dispatcher,
            projections: projections_state,
            publish_pipeline,
            api_keys,
            auth,
            authz,
            system_tenant_id,
            management_namespace_id,
        })
    }
}

/// Walks `<config_root>/<tenant>/<namespace>/<topic>.json` to recover the
/// full set of registered topics; `TopicRegistry`'s cache only holds what
/// has already been loaded on demand, so bootstrap needs its own scan to
/// know which dispatchers a restart must bring back up.
fn discover_registered_topics(config_root: &std::path::Path) -> Result<Vec<(String, String, String)>, BrokerError> {
    let mut discovered = Vec::new();
    for tenant in broker_fsutil::list_dir_names_sorted(config_root).map_err(BrokerError::Io)? {
        if tenant == "consumers" {
            continue;
        }
        let tenant_dir = config_root.join(&tenant);
        for namespace in broker_fsutil::list_dir_names_sorted(&tenant_dir).map_err(BrokerError::Io)? {
            let namespace_dir = tenant_dir.join(&namespace);
            for topic in broker_fsutil::list_json_stems_sorted(&namespace_dir).map_err(BrokerError::Io)? {
                discovered.push((tenant.clone(), namespace.clone(), topic));
            }
        }
    }
    Ok(discovered)
}
