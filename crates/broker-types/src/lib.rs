//! Core domain types shared by every layer of the event store and webhook broker.
//!
//! This crate has no filesystem or network dependencies: it owns the data model
//! and the event id wire format, so that storage, dispatch,
//! projection, and authorization crates can all depend on the same vocabulary
//! without depending on each other.

pub mod error;
pub mod ids;

pub use error::ErrorCode;
pub use ids::EventId;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable, already-sequenced event as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Canonical id: `<tenant>/<namespace>/<topic>-<sequence>`.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// One (eventType -> JSON Schema) entry in a topic's additive schema list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSchema {
    pub event_type: String,
    pub schema: serde_json::Value,
}

/// Persistent topic configuration. Mutated only by sequence allocation and
/// additive schema updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub resource_id: Uuid,
    pub tenant_resource_id: Uuid,
    pub namespace_resource_id: Uuid,
    pub tenant: String,
    pub namespace: String,
    pub name: String,
    pub sequence: u64,
    pub schemas: Vec<TopicSchema>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Topic {
    pub fn schema_for(&self, event_type: &str) -> Option<&serde_json::Value> {
        self.schemas
            .iter()
            .find(|s| s.event_type == event_type)
            .map(|s| &s.schema)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// The transport a consumer receives deliveries over. HTTP is the only
/// production variant; `InMemory` exists so dispatcher tests can assert on
/// delivered batches without a real listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ConsumerTransport {
    Http { callback: String },
    InMemory { handler_id: String },
}

/// Persistent consumer record. `topics` maps topic name to the last-delivered
/// event id, or `None` meaning "from tail at registration".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    pub id: Uuid,
    #[serde(flatten)]
    pub transport: ConsumerTransport,
    pub topics: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    #[serde(default)]
    pub last_delivery_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Suspended,
    Deleted,
    PendingActivation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub resource_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub resource_id: Uuid,
    pub tenant_resource_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Namespace {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub primary_tenant_id: Uuid,
    #[serde(default)]
    pub tenant_associations: BTreeSet<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_hash: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Option<BTreeSet<String>>,
}

impl ApiKey {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalType {
    User,
    ApiKey,
    Role,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Tenant,
    Namespace,
    Topic,
    Event,
    Consumer,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Create,
    Read,
    List,
    Update,
    Delete,
    Admin,
    SchemaManage,
    ReadHistory,
    ReadExport,
    WriteAdmin,
    Replay,
    Purge,
    Activate,
    Suspend,
    PasswordReset,
    Manage,
    PermissionGrant,
    PermissionRevoke,
}

/// A time-of-day window, local to UTC, in which a constrained grant applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_hour_utc: u8,
    pub end_hour_utc: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantConstraints {
    #[serde(default)]
    pub event_types: Option<BTreeSet<String>>,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub principal_id: Uuid,
    pub principal_type: PrincipalType,
    pub resource_type: ResourceType,
    /// `None` means "all resources of that type in the given scope".
    pub resource_id: Option<Uuid>,
    pub tenant_resource_id: Uuid,
    #[serde(default)]
    pub namespace_resource_id: Option<Uuid>,
    #[serde(default)]
    pub topic_resource_id: Option<Uuid>,
    pub permissions: BTreeSet<Permission>,
    #[serde(default)]
    pub constraints: Option<GrantConstraints>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PermissionGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    pub fn satisfies(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission) || self.permissions.contains(&Permission::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_schema_lookup() {
        let topic = Topic {
            resource_id: Uuid::nil(),
            tenant_resource_id: Uuid::nil(),
            namespace_resource_id: Uuid::nil(),
            tenant: "acme".into(),
            namespace: "billing".into(),
            name: "invoices".into(),
            sequence: 0,
            schemas: vec![TopicSchema {
                event_type: "invoice.created".into(),
                schema: serde_json::json!({"type": "object"}),
            }],
            deleted_at: None,
        };
        assert!(topic.schema_for("invoice.created").is_some());
        assert!(topic.schema_for("invoice.voided").is_none());
    }

    #[test]
    fn api_key_active_requires_unrevoked_and_unexpired() {
        let now = Utc::now();
        let mut key = ApiKey {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            key_hash: "h".into(),
            name: "ci".into(),
            description: None,
            created_at: now,
            expires_at: None,
            revoked_at: None,
            scopes: None,
        };
        assert!(key.is_active(now));
        key.revoked_at = Some(now);
        assert!(!key.is_active(now));
        key.revoked_at = None;
        key.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(!key.is_active(now));
    }

    #[test]
    fn permission_grant_admin_satisfies_any_permission() {
        let grant = PermissionGrant {
            principal_id: Uuid::nil(),
            principal_type: PrincipalType::User,
            resource_type: ResourceType::Tenant,
            resource_id: None,
            tenant_resource_id: Uuid::nil(),
            namespace_resource_id: None,
            topic_resource_id: None,
            permissions: BTreeSet::from([Permission::Admin]),
            constraints: None,
            expires_at: None,
        };
        assert!(grant.satisfies(Permission::Update));
        assert!(grant.satisfies(Permission::Delete));
    }
}
