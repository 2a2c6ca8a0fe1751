//! Compiles and caches JSON Schema draft 2020-12 documents and validates
//! event payloads against them.
//!
//! Schemas are compiled once, at registration or update time, and the
//! compiled validator is what gets cached on the topic entry — publishing
//! never recompiles a schema.

use std::collections::HashMap;

use broker_types::ErrorCode;
use jsonschema::Validator;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema for event type {event_type} does not compile: {source}")]
    InvalidSchema {
        event_type: String,
        #[source]
        source: jsonschema::ValidationError<'static>,
    },
    #[error("payload failed validation for event type {event_type}: {errors:?}")]
    ValidationFailed { event_type: String, errors: Vec<String> },
}

impl ErrorCode for SchemaError {
    fn code(&self) -> &'static str {
        match self {
            SchemaError::InvalidSchema { .. } => "INVALID_INPUT",
            SchemaError::ValidationFailed { .. } => "SCHEMA_VALIDATION",
        }
    }
}

/// A compiled schema, one per registered event type on a topic.
pub struct CompiledSchema {
    event_type: String,
    validator: Validator,
    raw: serde_json::Value,
}

impl CompiledSchema {
    pub fn compile(event_type: impl Into<String>, schema: serde_json::Value) -> Result<Self, SchemaError> {
        let event_type = event_type.into();
        let validator = jsonschema::validator_for(&schema).map_err(|source| SchemaError::InvalidSchema {
            event_type: event_type.clone(),
            source,
        })?;
        Ok(Self { event_type, validator, raw: schema })
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    pub fn validate(&self, payload: &serde_json::Value) -> Result<(), SchemaError> {
        let errors: Vec<String> = self.validator.iter_errors(payload).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::ValidationFailed { event_type: self.event_type.clone(), errors })
        }
    }
}

/// The set of compiled schemas registered against a single topic, keyed by
/// event type. Cheap to clone-replace wholesale on an additive update.
#[derive(Default)]
pub struct SchemaSet {
    by_event_type: HashMap<String, CompiledSchema>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile_all(
        schemas: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Result<Self, SchemaError> {
        let mut set = Self::new();
        for (event_type, schema) in schemas {
            set.insert(event_type, schema)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, event_type: String, schema: serde_json::Value) -> Result<(), SchemaError> {
        let compiled = CompiledSchema::compile(event_type.clone(), schema)?;
        self.by_event_type.insert(event_type, compiled);
        Ok(())
    }

    pub fn get(&self, event_type: &str) -> Option<&CompiledSchema> {
        self.by_event_type.get(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.by_event_type.keys().map(String::as_str)
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.by_event_type.contains_key(event_type)
    }
}
