//! Resolves a raw credential to a principal. Two kinds, checked in order:
//! API key, then session. Both the session map and the API-key cache are
//! `tokio::sync::RwLock`-guarded `HashMap`s — enough at this scale without
//! reaching for a concurrent-map crate.

use std::collections::HashMap;
use std::sync::Arc;

use broker_types::ApiKey;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api_key::hash_api_key;
use crate::error::AuthError;
use crate::password::verify_password;

/// Source a resolved credential came from, kept for logging/audit — mirrors
/// how this codebase tracks provenance for other resolved values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ApiKey,
    Session,
}

#[derive(Debug, Clone)]
pub struct ResolvedPrincipal {
    pub user_id: Uuid,
    pub source: CredentialSource,
    pub api_key_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
struct Session {
    user_id: Uuid,
    created_at: DateTime<Utc>,
}

/// Looks up an active API key by its SHA-256 hash. Implemented by whatever
/// holds the authoritative set of API keys (the projections crate); kept
/// abstract here so this crate has no dependency on event replay.
pub trait ApiKeyLookup: Send + Sync {
    fn find_by_hash(&self, hash: &str) -> Option<ApiKey>;
}

pub struct AuthenticationGateway<L: ApiKeyLookup> {
    lookup: Arc<L>,
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl<L: ApiKeyLookup> AuthenticationGateway<L> {
    pub fn new(lookup: Arc<L>) -> Self {
        Self { lookup, sessions: RwLock::new(HashMap::new()) }
    }

    /// Resolves a bearer credential: `es_...` is treated as an API key,
    /// anything else as a session id.
    pub async fn resolve_bearer(&self, credential: &str) -> Result<ResolvedPrincipal, AuthError> {
        if credential.starts_with(crate::api_key::API_KEY_PREFIX) {
            return self.resolve_api_key(credential);
        }
        self.resolve_session(credential).await
    }

    fn resolve_api_key(&self, plaintext: &str) -> Result<ResolvedPrincipal, AuthError> {
        let hash = hash_api_key(plaintext);
        let key = self.lookup.find_by_hash(&hash).ok_or(AuthError::Unauthorized)?;
        if !key.is_active(Utc::now()) {
            return Err(AuthError::Unauthorized);
        }
        Ok(ResolvedPrincipal { user_id: key.user_id, source: CredentialSource::ApiKey, api_key_id: Some(key.id) })
    }

    async fn resolve_session(&self, session_id_raw: &str) -> Result<ResolvedPrincipal, AuthError> {
        let session_id: Uuid = session_id_raw.parse().map_err(|_| AuthError::Unauthorized)?;
        let sessions = self.sessions.read().await;
        let session = sessions.get(&session_id).ok_or(AuthError::Unauthorized)?;
        Ok(ResolvedPrincipal { user_id: session.user_id, source: CredentialSource::Session, api_key_id: None })
    }

    /// Verifies email+password (bcrypt) and creates a new session, returning
    /// its id. Callers look the user up by email themselves and pass the
    /// stored password hash here.
    pub async fn login(&self, user_id: Uuid, plaintext_password: &str, password_hash: &str) -> Result<Uuid, AuthError> {
        if !verify_password(plaintext_password, password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        let session_id = Uuid::new_v4();
        self.sessions.write().await.insert(session_id, Session { user_id, created_at: Utc::now() });
        Ok(session_id)
    }

    pub async fn logout(&self, session_id: Uuid) {
        self.sessions.write().await.remove(&session_id);
    }
}
