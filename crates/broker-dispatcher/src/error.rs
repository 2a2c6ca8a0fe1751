use broker_types::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("consumer {id} not found")]
    ConsumerNotFound { id: uuid::Uuid },
    #[error("consumer {id} is already registered on topic {topic}")]
    AlreadySubscribed { id: uuid::Uuid, topic: String },
    #[error(transparent)]
    Store(#[from] broker_store::StoreError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl ErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::ConsumerNotFound { .. } => "CONSUMER_NOT_FOUND",
            Self::AlreadySubscribed { .. } => "CONSUMER_ALREADY_SUBSCRIBED",
            Self::Store(inner) => inner.code(),
            Self::Io(_) => "IO_ERROR",
        }
    }
}
