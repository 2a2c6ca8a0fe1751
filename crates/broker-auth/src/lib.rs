//! Credential resolution for the broker: bcrypt for user passwords, SHA-256
//! for API keys, and the session/API-key-cache maps behind the
//! `AuthenticationGateway`.

mod api_key;
mod error;
mod gateway;
mod password;

pub use api_key::{generate_plaintext, hash_api_key, API_KEY_PREFIX};
pub use error::AuthError;
pub use gateway::{ApiKeyLookup, AuthenticationGateway, CredentialSource, ResolvedPrincipal};
pub use password::{hash_password, verify_password};
