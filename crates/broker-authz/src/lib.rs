//! Evaluates whether a principal's permission grants allow a request,
//! including scope inheritance, constraints, and the soft-delete cascade.

use broker_types::{GrantConstraints, Permission, PermissionGrant, ResourceType};
use chrono::{DateTime, Timelike, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// The resource a request addresses, decomposed the way a URL path is.
pub struct AuthzRequest {
    pub principal_id: Uuid,
    pub permission: Permission,
    pub resource_type: ResourceType,
    pub resource_id: Option<Uuid>,
    pub tenant_resource_id: Uuid,
    pub namespace_resource_id: Option<Uuid>,
    pub event_type: Option<String>,
    /// The timestamp of the event being read, for requests that read a
    /// specific event (history/export/replay). `None` for requests with no
    /// single event to check a `maxAgeDays` constraint against.
    pub event_timestamp: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// Whether the tenant or namespace being addressed has been soft-deleted.
/// A deleted scope denies every check against it or anything inside it,
/// independent of any grant.
pub struct ScopeStatus {
    pub tenant_deleted: bool,
    pub namespace_deleted: bool,
}

pub struct AuthorizationEngine;

impl AuthorizationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, grants: &[PermissionGrant], request: &AuthzRequest, scope: &ScopeStatus) -> Decision {
        if scope.tenant_deleted || scope.namespace_deleted {
            return Decision::Deny;
        }

        let allowed = grants
            .iter()
            .filter(|grant| grant.principal_id == request.principal_id)
            .filter(|grant| grant.tenant_resource_id == request.tenant_resource_id)
            .filter(|grant| !grant.is_expired(request.now))
            .any(|grant| Self::grant_covers(grant, request) && Self::constraints_allow(grant, request));

        if allowed { Decision::Allow } else { Decision::Deny }
    }

    /// True if `grant` covers the addressed resource, either directly or
    /// through scope inheritance (ADMIN/SCHEMA_MANAGE at TENANT or
    /// NAMESPACE scope reaching down to everything inside it).
    fn grant_covers(grant: &PermissionGrant, request: &AuthzRequest) -> bool {
        let direct = grant.resource_type == request.resource_type
            && (grant.resource_id.is_none() || grant.resource_id == request.resource_id)
            && grant.satisfies(request.permission);
        if direct {
            return true;
        }

        let inherits_permission = grant.permissions.contains(&Permission::Admin)
            || (request.permission == Permission::SchemaManage && grant.permissions.contains(&Permission::SchemaManage));
        if !inherits_permission {
            return false;
        }

        let inheritable_below_tenant =
            matches!(request.resource_type, ResourceType::Namespace | ResourceType::Topic | ResourceType::Event | ResourceType::Consumer);
        let inheritable_below_namespace = matches!(request.resource_type, ResourceType::Topic | ResourceType::Event | ResourceType::Consumer);

        let from_tenant = grant.resource_type == ResourceType::Tenant && inheritable_below_tenant;
        let from_namespace = grant.resource_type == ResourceType::Namespace
            && inheritable_below_namespace
            && grant.namespace_resource_id.is_some()
            && grant.namespace_resource_id == request.namespace_resource_id;

        from_tenant || from_namespace
    }

    fn constraints_allow(grant: &PermissionGrant, request: &AuthzRequest) -> bool {
        let Some(constraints) = &grant.constraints else { return true };
        Self::event_type_allows(constraints, request)
            && Self::time_window_allows(constraints, request.now)
            && Self::max_age_allows(constraints, request)
    }

    /// `maxAgeDays` bounds how far back a read is allowed to reach; it only
    /// applies to requests that address a specific event's timestamp, not
    /// to creates, lists, or other requests with nothing to measure the age
    /// of.
    fn max_age_allows(constraints: &GrantConstraints, request: &AuthzRequest) -> bool {
        let (Some(max_age_days), Some(event_timestamp)) = (constraints.max_age_days, request.event_timestamp) else {
            return true;
        };
        let horizon = request.now - chrono::Duration::days(max_age_days.into());
        event_timestamp >= horizon
    }

    fn event_type_allows(constraints: &GrantConstraints, request: &AuthzRequest) -> bool {
        match (&constraints.event_types, &request.event_type) {
            (Some(allowed), Some(event_type)) => allowed.contains(event_type),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    fn time_window_allows(constraints: &GrantConstraints, now: DateTime<Utc>) -> bool {
        let Some(window) = &constraints.time_window else { return true };
        let hour = now.hour() as u8;
        if window.start_hour_utc <= window.end_hour_utc {
            hour >= window.start_hour_utc && hour < window.end_hour_utc
        } else {
            // window wraps past midnight, e.g. 22..6
            hour >= window.start_hour_utc || hour < window.end_hour_utc
        }
    }
}

impl Default for AuthorizationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_types::PrincipalType;
    use std::collections::BTreeSet;

    fn base_grant(resource_type: ResourceType, resource_id: Option<Uuid>, tenant_resource_id: Uuid, permissions: BTreeSet<Permission>) -> PermissionGrant {
        PermissionGrant {
            principal_id: Uuid::nil(),
            principal_type: PrincipalType::User,
            resource_type,
            resource_id,
            tenant_resource_id,
            namespace_resource_id: None,
            topic_resource_id: None,
            permissions,
            constraints: None,
            expires_at: None,
        }
    }

    fn request(permission: Permission, resource_type: ResourceType, resource_id: Option<Uuid>, tenant_resource_id: Uuid) -> AuthzRequest {
        AuthzRequest {
            principal_id: Uuid::nil(),
            permission,
            resource_type,
            resource_id,
            tenant_resource_id,
            namespace_resource_id: None,
            event_type: None,
            event_timestamp: None,
            now: Utc::now(),
        }
    }

    fn open_scope() -> ScopeStatus {
        ScopeStatus { tenant_deleted: false, namespace_deleted: false }
    }

    #[test]
    fn direct_grant_allows_matching_permission() {
        let tenant = Uuid::new_v4();
        let grant = base_grant(ResourceType::Topic, None, tenant, [Permission::Read].into_iter().collect());
        let request = request(Permission::Read, ResourceType::Topic, None, tenant);
        let engine = AuthorizationEngine::new();
        assert_eq!(engine.decide(&[grant], &request, &open_scope()), Decision::Allow);
    }

    #[test]
    fn missing_permission_denies() {
        let tenant = Uuid::new_v4();
        let grant = base_grant(ResourceType::Topic, None, tenant, [Permission::Read].into_iter().collect());
        let request = request(Permission::Delete, ResourceType::Topic, None, tenant);
        let engine = AuthorizationEngine::new();
        assert_eq!(engine.decide(&[grant], &request, &open_scope()), Decision::Deny);
    }

    #[test]
    fn tenant_admin_inherits_down_to_topic() {
        let tenant = Uuid::new_v4();
        let grant = base_grant(ResourceType::Tenant, None, tenant, [Permission::Admin].into_iter().collect());
        let request = request(Permission::Delete, ResourceType::Topic, Some(Uuid::new_v4()), tenant);
        let engine = AuthorizationEngine::new();
        assert_eq!(engine.decide(&[grant], &request, &open_scope()), Decision::Allow);
    }

    #[test]
    fn tenant_admin_does_not_inherit_to_tenant_itself_twice_removed() {
        // an ADMIN grant on a different tenant must not leak across tenants
        let tenant = Uuid::new_v4();
        let other_tenant = Uuid::new_v4();
        let grant = base_grant(ResourceType::Tenant, None, other_tenant, [Permission::Admin].into_iter().collect());
        let request = request(Permission::Delete, ResourceType::Topic, Some(Uuid::new_v4()), tenant);
        let engine = AuthorizationEngine::new();
        assert_eq!(engine.decide(&[grant], &request, &open_scope()), Decision::Deny);
    }

    #[test]
    fn soft_deleted_tenant_denies_regardless_of_grants() {
        let tenant = Uuid::new_v4();
        let grant = base_grant(ResourceType::Tenant, None, tenant, [Permission::Admin].into_iter().collect());
        let request = request(Permission::Read, ResourceType::Topic, None, tenant);
        let engine = AuthorizationEngine::new();
        let scope = ScopeStatus { tenant_deleted: true, namespace_deleted: false };
        assert_eq!(engine.decide(&[grant], &request, &scope), Decision::Deny);
    }

    #[test]
    fn expired_grant_is_ignored() {
        let tenant = Uuid::new_v4();
        let mut grant = base_grant(ResourceType::Topic, None, tenant, [Permission::Read].into_iter().collect());
        grant.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let request = request(Permission::Read, ResourceType::Topic, None, tenant);
        let engine = AuthorizationEngine::new();
        assert_eq!(engine.decide(&[grant], &request, &open_scope()), Decision::Deny);
    }

    #[test]
    fn event_type_constraint_restricts_grant() {
        let tenant = Uuid::new_v4();
        let mut grant = base_grant(ResourceType::Event, None, tenant, [Permission::Create].into_iter().collect());
        grant.constraints = Some(GrantConstraints { event_types: Some(["invoice.created".to_string()].into_iter().collect()), max_age_days: None, time_window: None });
        let engine = AuthorizationEngine::new();

        let mut allowed_request = request(Permission::Create, ResourceType::Event, None, tenant);
        allowed_request.event_type = Some("invoice.created".to_string());
        assert_eq!(engine.decide(std::slice::from_ref(&grant), &allowed_request, &open_scope()), Decision::Allow);

        let mut denied_request = request(Permission::Create, ResourceType::Event, None, tenant);
        denied_request.event_type = Some("invoice.voided".to_string());
        assert_eq!(engine.decide(&[grant], &denied_request, &open_scope()), Decision::Deny);
    }

    #[test]
    fn max_age_constraint_restricts_grant_to_recent_events() {
        let tenant = Uuid::new_v4();
        let mut grant = base_grant(ResourceType::Event, None, tenant, [Permission::Read].into_iter().collect());
        grant.constraints = Some(GrantConstraints { event_types: None, max_age_days: Some(30), time_window: None });
        let engine = AuthorizationEngine::new();

        let mut recent_request = request(Permission::Read, ResourceType::Event, None, tenant);
        recent_request.event_timestamp = Some(Utc::now() - chrono::Duration::days(1));
        assert_eq!(engine.decide(std::slice::from_ref(&grant), &recent_request, &open_scope()), Decision::Allow);

        let mut stale_request = request(Permission::Read, ResourceType::Event, None, tenant);
        stale_request.event_timestamp = Some(Utc::now() - chrono::Duration::days(31));
        assert_eq!(engine.decide(std::slice::from_ref(&grant), &stale_request, &open_scope()), Decision::Deny);

        // a request with no single event to measure (e.g. a list/create) is unaffected
        let untimed_request = request(Permission::Read, ResourceType::Event, None, tenant);
        assert_eq!(engine.decide(&[grant], &untimed_request, &open_scope()), Decision::Allow);
    }
}
