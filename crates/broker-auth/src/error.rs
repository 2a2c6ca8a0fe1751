use broker_types::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid or missing credential")]
    Unauthorized,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    HashingFailed(#[from] bcrypt::BcryptError),
}

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::HashingFailed(_) => "IO_ERROR",
        }
    }
}
