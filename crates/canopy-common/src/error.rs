//! Error types for the Canopy pipeline
//!
//! One error enum covers every pipeline operation. The first five variants are
//! the caller-facing kinds; the rest are infrastructure failures.

use thiserror::Error;

/// Result type alias using CanopyError
pub type Result<T> = std::result::Result<T, CanopyError>;

/// Unified error type for Canopy operations
#[derive(Debug, Error)]
pub enum CanopyError {
    /// Referenced entity absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate id on creation
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Out-of-range numeric input, unrecognized enum value, malformed date
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Too few usable observations for consensus
    #[error("Insufficient data: {available} usable observations, {required} required")]
    InsufficientData { required: usize, available: usize },

    /// Entity is in the wrong state for the operation
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A key read by the transaction changed before commit
    #[error("Transaction conflict on key {key}: read {read:?}, current {current:?}")]
    Conflict {
        key: String,
        read: Option<u64>,
        current: Option<u64>,
    },

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    InsufficientData,
    PreconditionFailed,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Wire code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::InsufficientData => "INSUFFICIENT_DATA",
            ErrorKind::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl CanopyError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CanopyError::NotFound(_) => ErrorKind::NotFound,
            CanopyError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            CanopyError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CanopyError::InsufficientData { .. } => ErrorKind::InsufficientData,
            CanopyError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            CanopyError::Conflict { .. } => ErrorKind::Conflict,
            CanopyError::Storage(_)
            | CanopyError::Serialization(_)
            | CanopyError::Config(_)
            | CanopyError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        CanopyError::NotFound(what.to_string())
    }

    pub fn invalid(what: impl std::fmt::Display) -> Self {
        CanopyError::InvalidArgument(what.to_string())
    }

    pub fn precondition(what: impl std::fmt::Display) -> Self {
        CanopyError::PreconditionFailed(what.to_string())
    }
}

// Implement From for common external error types
impl From<serde_json::Error> for CanopyError {
    fn from(err: serde_json::Error) -> Self {
        CanopyError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CanopyError {
    fn from(err: std::io::Error) -> Self {
        CanopyError::Storage(err.to_string())
    }
}

impl From<chrono::ParseError> for CanopyError {
    fn from(err: chrono::ParseError) -> Self {
        CanopyError::InvalidArgument(format!("malformed date: {}", err))
    }
}

impl From<anyhow::Error> for CanopyError {
    fn from(err: anyhow::Error) -> Self {
        CanopyError::Internal(err.to_string())
    }
}
