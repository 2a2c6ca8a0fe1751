//! Password hashing for user accounts. bcrypt is a library call here, not
//! reimplemented.

use crate::error::AuthError;

const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

pub fn hash_password(plaintext: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(plaintext, BCRYPT_COST)?)
}

pub fn verify_password(plaintext: &str, hash: &str) -> Result<bool, AuthError> {
    Ok(bcrypt::verify(plaintext, hash)?)
}
