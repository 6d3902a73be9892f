//! Error types for the rowmap engine.

use thiserror::Error;

/// All possible errors from the rowmap engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Codec registry errors
    #[error("field type already registered: {0}")]
    DuplicateType(String),

    #[error("field type not registered: {0}")]
    CodecNotFound(String),

    // Field schema errors
    #[error("field '{0}' has no default value")]
    NoDefault(String),

    #[error("enum field '{0}' has no allowed values configured")]
    InvalidEnumConfig(String),

    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("invalid model definition: {0}")]
    InvalidModelDef(String),

    // Collection errors
    #[error("type mismatch at index {index}: expected Entity, got {got}")]
    TypeMismatch { index: usize, got: String },

    // Persistence errors
    #[error("model not registered: {0}")]
    ModelNotFound(String),

    #[error("record not found in '{table}' for key {key}")]
    RecordNotFound { table: String, key: String },

    #[error("entity of '{0}' has no primary key value")]
    MissingKey(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// Wrap a failure reported by a query store.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Error::Persistence(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
