//! Pure folds from management events to in-memory read models. Each
//! projection is rebuilt by replaying its topic in order at startup and
//! kept current by applying new events synchronously after publish.

use std::collections::HashMap;

use broker_types::{ApiKey, Event, Namespace, Permission, PermissionGrant, ResourceType, Tenant, User, UserStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct Projections {
    pub tenants: HashMap<Uuid, Tenant>,
    pub namespaces: HashMap<Uuid, Namespace>,
    pub users: HashMap<Uuid, User>,
    pub api_keys: HashMap<Uuid, ApiKey>,
    pub permissions: Vec<PermissionGrant>,
}

impl Projections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant_by_name(&self, name: &str) -> Option<&Tenant> {
        self.tenants.values().find(|t| t.name == name)
    }

    pub fn namespace_by_name(&self, tenant_resource_id: Uuid, name: &str) -> Option<&Namespace> {
        self.namespaces.values().find(|n| n.tenant_resource_id == tenant_resource_id && n.name == name)
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }

    /// Non-expired grants for a principal against a given resource type,
    /// filtered at query time rather than at fold time.
    pub fn active_grants_for(&self, principal_id: Uuid, resource_type: ResourceType, now: DateTime<Utc>) -> Vec<&PermissionGrant> {
        self.permissions
            .iter()
            .filter(|g| g.principal_id == principal_id && g.resource_type == resource_type && !g.is_expired(now))
            .collect()
    }

    /// Applies one event from a management topic to the relevant read
    /// model. Unknown event types are logged and ignored rather than
    /// treated as an error, so forward-compatible event types don't break
    /// replay of older logs.
    pub fn apply(&mut self, topic: &str, event: &Event) {
        let applied = match topic {
            crate::reserved::TENANTS_TOPIC => self.apply_tenant(event),
            crate::reserved::NAMESPACES_TOPIC => self.apply_namespace(event),
            crate::reserved::USERS_TOPIC => self.apply_user(event),
            crate::reserved::API_KEYS_TOPIC => self.apply_api_key(event),
            crate::reserved::PERMISSIONS_TOPIC => self.apply_permission(event),
            _ => false,
        };
        if !applied {
            tracing::warn!(topic, event_type = %event.event_type, "unrecognized management event, ignoring");
        }
    }

    fn apply_tenant(&mut self, event: &Event) -> bool {
        match event.event_type.as_str() {
            "tenant.created" => {
                if let Ok(payload) = serde_json::from_value::<TenantCreated>(event.payload.clone()) {
                    self.tenants.insert(payload.resource_id, Tenant { resource_id: payload.resource_id, name: payload.name, deleted_at: None });
                }
                true
            }
            "tenant.updated" => {
                if let Ok(payload) = serde_json::from_value::<TenantUpdated>(event.payload.clone())
                    && let Some(tenant) = self.tenants.get_mut(&payload.resource_id)
                {
                    tenant.name = payload.name;
                }
                true
            }
            "tenant.deleted" => {
                if let Ok(payload) = serde_json::from_value::<ResourceIdOnly>(event.payload.clone())
                    && let Some(tenant) = self.tenants.get_mut(&payload.resource_id)
                {
                    tenant.deleted_at = Some(event.timestamp);
                }
                true
            }
            _ => false,
        }
    }

    fn apply_namespace(&mut self, event: &Event) -> bool {
        match event.event_type.as_str() {
            "namespace.created" => {
                if let Ok(payload) = serde_json::from_value::<NamespaceCreated>(event.payload.clone()) {
                    self.namespaces.insert(
                        payload.resource_id,
                        Namespace { resource_id: payload.resource_id, tenant_resource_id: payload.tenant_resource_id, name: payload.name, deleted_at: None },
                    );
                }
                true
            }
            "namespace.deleted" => {
                if let Ok(payload) = serde_json::from_value::<ResourceIdOnly>(event.payload.clone())
                    && let Some(namespace) = self.namespaces.get_mut(&payload.resource_id)
                {
                    namespace.deleted_at = Some(event.timestamp);
                }
                true
            }
            _ => false,
        }
    }

    fn apply_user(&mut self, event: &Event) -> bool {
        match event.event_type.as_str() {
            "user.created" => {
                if let Ok(payload) = serde_json::from_value::<UserCreated>(event.payload.clone()) {
                    self.users.insert(
                        payload.id,
                        User {
                            id: payload.id,
                            email: payload.email,
                            password_hash: payload.password_hash,
                            status: payload.status.unwrap_or(UserStatus::Active),
                            primary_tenant_id: payload.primary_tenant_id,
                            tenant_associations: std::iter::once(payload.primary_tenant_id).collect(),
                        },
                    );
                }
                true
            }
            "user.status.changed" => {
                if let Ok(payload) = serde_json::from_value::<UserStatusChanged>(event.payload.clone())
                    && let Some(user) = self.users.get_mut(&payload.id)
                {
                    user.status = payload.status;
                }
                true
            }
            "user.password.changed" => {
                if let Ok(payload) = serde_json::from_value::<UserPasswordChanged>(event.payload.clone())
                    && let Some(user) = self.users.get_mut(&payload.id)
                {
                    user.password_hash = payload.password_hash;
                }
                true
            }
            "user.tenant.assigned" => {
                if let Ok(payload) = serde_json::from_value::<UserTenantAssignment>(event.payload.clone())
                    && let Some(user) = self.users.get_mut(&payload.id)
                {
                    user.tenant_associations.insert(payload.tenant_resource_id);
                }
                true
            }
            "user.tenant.removed" => {
                if let Ok(payload) = serde_json::from_value::<UserTenantAssignment>(event.payload.clone())
                    && let Some(user) = self.users.get_mut(&payload.id)
                {
                    user.tenant_associations.remove(&payload.tenant_resource_id);
                }
                true
            }
            _ => false,
        }
    }

    fn apply_api_key(&mut self, event: &Event) -> bool {
        match event.event_type.as_str() {
            "api_key.created" => {
                if let Ok(key) = serde_json::from_value::<ApiKey>(event.payload.clone()) {
                    self.api_keys.insert(key.id, key);
                }
                true
            }
            "api_key.revoked" => {
                if let Ok(payload) = serde_json::from_value::<ResourceIdOnly>(event.payload.clone())
                    && let Some(key) = self.api_keys.get_mut(&payload.resource_id)
                {
                    key.revoked_at = Some(event.timestamp);
                }
                true
            }
            _ => false,
        }
    }

    fn apply_permission(&mut self, event: &Event) -> bool {
        match event.event_type.as_str() {
            "permission.granted" => {
                if let Ok(grant) = serde_json::from_value::<PermissionGrant>(event.payload.clone()) {
                    self.permissions.push(grant);
                }
                true
            }
            "permission.revoked" => {
                if let Ok(payload) = serde_json::from_value::<PermissionRevoked>(event.payload.clone()) {
                    self.revoke(&payload);
                }
                true
            }
            _ => false,
        }
    }

    /// Removes the intersection of (principal, resource, permission-set)
    /// from any active grants; a grant left with no permissions is dropped
    /// entirely.
    fn revoke(&mut self, revoked: &PermissionRevoked) {
        self.permissions.retain_mut(|grant| {
            if grant.principal_id != revoked.principal_id
                || grant.resource_type != revoked.resource_type
                || grant.resource_id != revoked.resource_id
            {
                return true;
            }
            for permission in &revoked.permissions {
                grant.permissions.remove(permission);
            }
            !grant.permissions.is_empty()
        });
    }
}

#[derive(Deserialize)]
struct ResourceIdOnly {
    #[serde(rename = "resourceId")]
    resource_id: Uuid,
}

#[derive(Deserialize)]
struct TenantCreated {
    #[serde(rename = "resourceId")]
    resource_id: Uuid,
    name: String,
}

#[derive(Deserialize)]
struct TenantUpdated {
    #[serde(rename = "resourceId")]
    resource_id: Uuid,
    name: String,
}

#[derive(Deserialize)]
struct NamespaceCreated {
    #[serde(rename = "resourceId")]
    resource_id: Uuid,
    #[serde(rename = "tenantResourceId")]
    tenant_resource_id: Uuid,
    name: String,
}

#[derive(Deserialize)]
struct UserCreated {
    id: Uuid,
    email: String,
    #[serde(rename = "passwordHash")]
    password_hash: String,
    status: Option<UserStatus>,
    #[serde(rename = "primaryTenantId")]
    primary_tenant_id: Uuid,
}

#[derive(Deserialize)]
struct UserStatusChanged {
    id: Uuid,
    status: UserStatus,
}

#[derive(Deserialize)]
struct UserPasswordChanged {
    id: Uuid,
    #[serde(rename = "passwordHash")]
    password_hash: String,
}

#[derive(Deserialize)]
struct UserTenantAssignment {
    id: Uuid,
    #[serde(rename = "tenantResourceId")]
    tenant_resource_id: Uuid,
}

#[derive(Deserialize)]
struct PermissionRevoked {
    #[serde(rename = "principalId")]
    principal_id: Uuid,
    #[serde(rename = "resourceType")]
    resource_type: ResourceType,
    #[serde(rename = "resourceId")]
    resource_id: Option<Uuid>,
    permissions: std::collections::BTreeSet<Permission>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_types::PrincipalType;
    use serde_json::json;

    fn event(event_type: &str, payload: serde_json::Value) -> Event {
        Event { id: "acme/billing/tenants-1".into(), timestamp: Utc::now(), event_type: event_type.into(), payload }
    }

    #[test]
    fn tenant_created_inserts() {
        let mut projections = Projections::new();
        let resource_id = Uuid::new_v4();
        projections.apply("tenants", &event("tenant.created", json!({"resourceId": resource_id, "name": "acme"})));
        assert_eq!(projections.tenant_by_name("acme").expect("found").resource_id, resource_id);
    }

    #[test]
    fn tenant_deleted_sets_deleted_at() {
        let mut projections = Projections::new();
        let resource_id = Uuid::new_v4();
        projections.apply("tenants", &event("tenant.created", json!({"resourceId": resource_id, "name": "acme"})));
        projections.apply("tenants", &event("tenant.deleted", json!({"resourceId": resource_id})));
        assert!(projections.tenants[&resource_id].is_deleted());
    }

    #[test]
    fn user_created_then_status_changed() {
        let mut projections = Projections::new();
        let id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        projections.apply(
            "users",
            &event("user.created", json!({"id": id, "email": "a@b.com", "passwordHash": "h", "primaryTenantId": tenant_id})),
        );
        assert_eq!(projections.users[&id].status, UserStatus::Active);

        projections.apply("users", &event("user.status.changed", json!({"id": id, "status": "SUSPENDED"})));
        assert_eq!(projections.users[&id].status, UserStatus::Suspended);
    }

    #[test]
    fn permission_granted_then_partially_revoked() {
        let mut projections = Projections::new();
        let principal_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let grant = PermissionGrant {
            principal_id,
            principal_type: PrincipalType::User,
            resource_type: ResourceType::Tenant,
            resource_id: None,
            tenant_resource_id: tenant_id,
            namespace_resource_id: None,
            topic_resource_id: None,
            permissions: [Permission::Read, Permission::Update].into_iter().collect(),
            constraints: None,
            expires_at: None,
        };
        projections.apply("permissions", &event("permission.granted", serde_json::to_value(&grant).unwrap()));
        assert_eq!(projections.permissions.len(), 1);

        projections.apply(
            "permissions",
            &event(
                "permission.revoked",
                json!({"principalId": principal_id, "resourceType": "TENANT", "resourceId": null, "permissions": ["UPDATE"]}),
            ),
        );
        assert_eq!(projections.permissions[0].permissions, [Permission::Read].into_iter().collect());
    }

    #[test]
    fn permission_revoke_drops_grant_when_empty() {
        let mut projections = Projections::new();
        let principal_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let grant = PermissionGrant {
            principal_id,
            principal_type: PrincipalType::User,
            resource_type: ResourceType::Tenant,
            resource_id: None,
            tenant_resource_id: tenant_id,
            namespace_resource_id: None,
            topic_resource_id: None,
            permissions: [Permission::Read].into_iter().collect(),
            constraints: None,
            expires_at: None,
        };
        projections.apply("permissions", &event("permission.granted", serde_json::to_value(&grant).unwrap()));
        projections.apply(
            "permissions",
            &event("permission.revoked", json!({"principalId": principal_id, "resourceType": "TENANT", "resourceId": null, "permissions": ["READ"]})),
        );
        assert!(projections.permissions.is_empty());
    }
}
