//! Translates the human-readable names used in URLs into the stable UUIDs
//! permission grants reference. Topic name resolution is not handled here —
//! topics live in `TopicRegistry`, not the event-sourced control plane.

use uuid::Uuid;

use crate::projections::Projections;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("tenant {0} not found")]
    TenantNotFound(String),
    #[error("namespace {0} not found in tenant")]
    NamespaceNotFound(String),
}

pub struct ResourceResolver<'a> {
    projections: &'a Projections,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(projections: &'a Projections) -> Self {
        Self { projections }
    }

    pub fn resolve_tenant(&self, tenant_name: &str) -> Result<Uuid, ResolveError> {
        self.projections
            .tenant_by_name(tenant_name)
            .filter(|t| !t.is_deleted())
            .map(|t| t.resource_id)
            .ok_or_else(|| ResolveError::TenantNotFound(tenant_name.to_string()))
    }

    pub fn resolve_namespace(&self, tenant_name: &str, namespace_name: &str) -> Result<Uuid, ResolveError> {
        let tenant_id = self.resolve_tenant(tenant_name)?;
        self.projections
            .namespace_by_name(tenant_id, namespace_name)
            .filter(|n| !n.is_deleted())
            .map(|n| n.resource_id)
            .ok_or_else(|| ResolveError::NamespaceNotFound(namespace_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_types::{Namespace, Tenant};

    #[test]
    fn resolves_tenant_and_namespace_by_name() {
        let mut projections = Projections::new();
        let tenant_id = Uuid::new_v4();
        let namespace_id = Uuid::new_v4();
        projections.tenants.insert(tenant_id, Tenant { resource_id: tenant_id, name: "acme".into(), deleted_at: None });
        projections.namespaces.insert(namespace_id, Namespace { resource_id: namespace_id, tenant_resource_id: tenant_id, name: "billing".into(), deleted_at: None });

        let resolver = ResourceResolver::new(&projections);
        assert_eq!(resolver.resolve_tenant("acme").expect("tenant"), tenant_id);
        assert_eq!(resolver.resolve_namespace("acme", "billing").expect("namespace"), namespace_id);
    }

    #[test]
    fn missing_tenant_is_not_found() {
        let projections = Projections::new();
        let resolver = ResourceResolver::new(&projections);
        assert!(resolver.resolve_tenant("ghost").is_err());
    }

    #[test]
    fn soft_deleted_tenant_resolves_as_not_found() {
        let mut projections = Projections::new();
        let tenant_id = Uuid::new_v4();
        projections.tenants.insert(tenant_id, Tenant { resource_id: tenant_id, name: "acme".into(), deleted_at: Some(chrono::Utc::now()) });
        let resolver = ResourceResolver::new(&projections);
        assert!(resolver.resolve_tenant("acme").is_err());
    }
}
