//! Event id wire format: `<tenant>/<namespace>/<topic>-<sequence>`.
//!
//! A legacy single-segment form (`<topic>-<sequence>`) is accepted on input
//! for backward compatibility but is never produced by `encode`.

use std::fmt;

/// A decoded event id. `tenant`/`namespace` are `None` only when the id was
/// parsed from the legacy single-segment form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventId {
    pub tenant: Option<String>,
    pub namespace: Option<String>,
    pub topic: String,
    pub sequence: u64,
}

impl EventId {
    pub fn new(tenant: impl Into<String>, namespace: impl Into<String>, topic: impl Into<String>, sequence: u64) -> Self {
        Self {
            tenant: Some(tenant.into()),
            namespace: Some(namespace.into()),
            topic: topic.into(),
            sequence,
        }
    }

    /// Parse any segment other than the trailing numeric sequence may contain
    /// any character except `/`; the sequence is split off the final `-`.
    pub fn parse(raw: &str) -> Result<Self, InvalidEventId> {
        let segments: Vec<&str> = raw.split('/').collect();
        let (scope, last) = match segments.as_slice() {
            [single] => (Vec::new(), *single),
            [rest @ .., last] => (rest.to_vec(), *last),
            [] => return Err(InvalidEventId(raw.to_string())),
        };

        let (topic, seq_str) = last
            .rsplit_once('-')
            .ok_or_else(|| InvalidEventId(raw.to_string()))?;
        let sequence: u64 = seq_str
            .parse()
            .map_err(|_| InvalidEventId(raw.to_string()))?;

        if topic.is_empty() {
            return Err(InvalidEventId(raw.to_string()));
        }

        match scope.as_slice() {
            [] => Ok(Self {
                tenant: None,
                namespace: None,
                topic: topic.to_string(),
                sequence,
            }),
            [tenant, namespace] => Ok(Self {
                tenant: Some(tenant.to_string()),
                namespace: Some(namespace.to_string()),
                topic: topic.to_string(),
                sequence,
            }),
            _ => Err(InvalidEventId(raw.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.tenant, &self.namespace) {
            (Some(t), Some(n)) => write!(f, "{t}/{n}/{}-{}", self.topic, self.sequence),
            _ => write!(f, "{}-{}", self.topic, self.sequence),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid event id: {0}")]
pub struct InvalidEventId(pub String);
