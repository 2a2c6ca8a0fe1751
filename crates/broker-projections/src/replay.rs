//! Rebuilds a [`Projections`] by replaying the five management topics in
//! order, and a helper to apply the tail after a fresh publish.

use broker_store::EventStore;

use crate::projections::Projections;
use crate::reserved::{MANAGEMENT_NAMESPACE, MANAGEMENT_TOPICS, SYSTEM_TENANT};

pub fn rebuild(store: &EventStore) -> Projections {
    let mut projections = Projections::new();
    for topic in MANAGEMENT_TOPICS {
        let events = store.read_since(SYSTEM_TENANT, MANAGEMENT_NAMESPACE, topic, 0, None).unwrap_or_default();
        for event in &events {
            projections.apply(topic, event);
        }
    }
    projections
}

/// Re-reads events for `topic` past `last_applied_sequence` and applies
/// them. Used both for the synchronous post-publish update and for the
/// periodic reconciliation pass that covers a missed notification.
pub fn reconcile(store: &EventStore, projections: &mut Projections, topic: &str, last_applied_sequence: u64) -> u64 {
    let events = store.read_since(SYSTEM_TENANT, MANAGEMENT_NAMESPACE, topic, last_applied_sequence, None).unwrap_or_default();
    let mut highest = last_applied_sequence;
    for event in &events {
        projections.apply(topic, event);
        if let Ok(id) = broker_types::EventId::parse(&event.id) {
            highest = highest.max(id.sequence);
        }
    }
    highest
}
