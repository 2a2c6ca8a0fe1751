//! Event-sourced read models for the control plane: tenants, namespaces,
//! users, API keys, and permissions, each a pure fold of its reserved
//! management topic.

mod projections;
mod replay;
mod reserved;
mod resolver;

pub use projections::Projections;
pub use replay::{rebuild, reconcile};
pub use reserved::{API_KEYS_TOPIC, MANAGEMENT_NAMESPACE, MANAGEMENT_TOPICS, NAMESPACES_TOPIC, PERMISSIONS_TOPIC, SYSTEM_TENANT, TENANTS_TOPIC, USERS_TOPIC};
pub use resolver::{ResolveError, ResourceResolver};
