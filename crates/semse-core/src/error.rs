//! Error types shared across the pipeline and retrieval path.

use thiserror::Error;

/// A single problem with one field of an input record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{0} missing or empty")]
    Missing(&'static str),

    #[error("{field} must be a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("embedding must be an array of numbers")]
    InvalidEmbedding,

    #[error("embedding has {actual} dimensions, expected {expected}")]
    EmbeddingDimensions { expected: usize, actual: usize },

    #[error("record must be a JSON object")]
    NotAnObject,
}

impl FieldError {
    /// Name of the offending field (`"record"` for shape errors).
    pub fn field(&self) -> &'static str {
        match self {
            FieldError::Missing(field) => field,
            FieldError::WrongType { field, .. } => field,
            FieldError::InvalidDate(_) => "date",
            FieldError::InvalidEmbedding | FieldError::EmbeddingDimensions { .. } => "embedding",
            FieldError::NotAnObject => "record",
        }
    }
}

/// Aggregate validation failure carrying every field error found in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", join_errors(.errors))]
pub struct ValidationError {
    errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }

    /// True if one of the collected errors concerns `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field() == field)
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of an external service call (completion or embedding).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} provider is disabled")]
    Disabled { service: &'static str },

    #[error("missing credentials: {0}")]
    Credentials(String),

    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed {service} response: {message}")]
    MalformedResponse {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn malformed(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::MalformedResponse {
            service,
            message: message.into(),
        }
    }
}

/// Failure of the key-value/vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation failed: {0}")]
    Backend(String),

    #[error("index '{0}' already exists")]
    IndexExists(String),

    #[error("index '{0}' not found")]
    UnknownIndex(String),

    #[error("index '{name}' exists with an incompatible schema: {detail}")]
    IndexMismatch { name: String, detail: String },

    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("field '{field}' could not be decoded: {reason}")]
    Codec { field: String, reason: String },

    #[error("invalid key pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

impl StoreError {
    pub fn codec(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Codec {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of a retrieval request.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Caller supplied an unusable request; no service was contacted.
    #[error("invalid search request: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
