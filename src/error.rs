//! Error types for the MetaNode ledger subsystem.

use thiserror::Error;

/// Local store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid record key: {0}")]
    InvalidKey(String),

    #[error("Failed to serialize record {key}: {message}")]
    Serialization { key: String, message: String },

    #[error("Failed to deserialize record {key}: {message}")]
    Deserialization { key: String, message: String },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Discriminator for [`LedgerError`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Remote,
    Integrity,
    NotFound,
    Storage,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Remote => "remote_error",
            ErrorKind::Integrity => "integrity_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Storage => "storage_error",
            ErrorKind::Config => "config_error",
        }
    }
}

/// Errors surfaced by agreements, proof logs, verification and telemetry.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Missing or malformed input, raised before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-success HTTP status, RPC error object, transport failure or timeout.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Locally recomputed hash differs from the stored or claimed one.
    #[error("Integrity error: expected hash {expected}, computed {computed}")]
    Integrity { expected: String, computed: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::Remote(_) => ErrorKind::Remote,
            LedgerError::Integrity { .. } => ErrorKind::Integrity,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::Storage(_) => ErrorKind::Storage,
            LedgerError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        LedgerError::Config(err.to_string())
    }
}
