use broker_types::ErrorCode;

/// Aggregates every crate-scoped error in the workspace behind one type, so
/// a future HTTP adapter has a single `Result<T, BrokerError>` to map from
/// `code()` to a status, without knowing which crate raised the failure.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Store(#[from] broker_store::StoreError),
    #[error(transparent)]
    Schema(#[from] broker_schema::SchemaError),
    #[error(transparent)]
    Dispatch(#[from] broker_dispatcher::DispatchError),
    #[error(transparent)]
    Auth(#[from] broker_auth::AuthError),
    #[error(transparent)]
    Config(#[from] broker_config::ConfigError),
    #[error("permission denied")]
    PermissionDenied,
    #[error("io error: {0}")]
    Io(#[from] anyhow::Error),
}

impl ErrorCode for BrokerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Store(inner) => inner.code(),
            Self::Schema(inner) => inner.code(),
            Self::Dispatch(inner) => inner.code(),
            Self::Auth(inner) => inner.code(),
            Self::Config(inner) => inner.code(),
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Io(_) => "IO_ERROR",
        }
    }
}
