//! The API-key-hash to key-record cache the authentication gateway consults
//! synchronously: a plain `RwLock`-guarded map kept current by
//! the projection layer rather than scanning all projections per request.

use std::collections::HashMap;
use std::sync::RwLock;

use broker_auth::ApiKeyLookup;
use broker_projections::Projections;
use broker_types::ApiKey;

#[derive(Default)]
pub struct ApiKeyCache {
    by_hash: RwLock<HashMap<String, ApiKey>>,
}

impl ApiKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the cache from the current projection snapshot. Called
    /// after bootstrap replay and after every `api-keys` topic apply.
    pub fn refresh(&self, projections: &Projections) {
        let mut by_hash = self.by_hash.write().expect("poisoned");
        by_hash.clear();
        for key in projections.api_keys.values() {
            by_hash.insert(key.key_hash.clone(), key.clone());
        }
    }
}

impl ApiKeyLookup for ApiKeyCache {
    fn find_by_hash(&self, hash: &str) -> Option<ApiKey> {
        self.by_hash.read().expect("poisoned").get(hash).cloned()
    }
}
