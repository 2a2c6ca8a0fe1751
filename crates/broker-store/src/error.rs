use broker_schema::SchemaError;
use broker_types::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("topic {tenant}/{namespace}/{name} not found")]
    TopicNotFound { tenant: String, namespace: String, name: String },

    #[error("topic {tenant}/{namespace}/{name} already exists")]
    TopicAlreadyExists { tenant: String, namespace: String, name: String },

    #[error("no schema registered for event type {event_type} on topic {topic}")]
    SchemaNotFound { topic: String, event_type: String },

    #[error("schema update would remove event type {event_type}, which is still registered")]
    SchemaRemovalNotAllowed { event_type: String },

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("io error: {0}")]
    Io(#[from] anyhow::Error),
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            StoreError::TopicNotFound { .. } => "TOPIC_NOT_FOUND",
            StoreError::TopicAlreadyExists { .. } => "TOPIC_ALREADY_EXISTS",
            StoreError::SchemaNotFound { .. } => "SCHEMA_NOT_FOUND",
            StoreError::SchemaRemovalNotAllowed { .. } => "SCHEMA_REMOVAL_NOT_ALLOWED",
            StoreError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            StoreError::Schema(inner) => inner.code(),
            StoreError::Io(_) => "IO_ERROR",
        }
    }
}
