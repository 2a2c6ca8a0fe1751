//! Names reserved for the event-sourced control plane. Ordinary tenants,
//! namespaces, and topics may never collide with these.

pub const SYSTEM_TENANT: &str = "$system";
pub const MANAGEMENT_NAMESPACE: &str = "$management";

pub const TENANTS_TOPIC: &str = "tenants";
pub const NAMESPACES_TOPIC: &str = "namespaces";
pub const USERS_TOPIC: &str = "users";
pub const PERMISSIONS_TOPIC: &str = "permissions";
pub const API_KEYS_TOPIC: &str = "api-keys";

pub const MANAGEMENT_TOPICS: [&str; 5] =
    [TENANTS_TOPIC, NAMESPACES_TOPIC, USERS_TOPIC, PERMISSIONS_TOPIC, API_KEYS_TOPIC];
