//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Failures reported by a key-value backend adapter.
///
/// Each kind is kept distinct so callers can tell a slow backend from a
/// dead one or from a rejected command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached
    #[error("backend connection failed: {0}")]
    Connection(String),

    /// The backend did not answer in time
    #[error("backend timed out: {0}")]
    Timeout(String),

    /// The backend answered with an error
    #[error("backend command failed: {0}")]
    Command(String),
}

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// A value could not be encoded; nothing was written
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes did not parse into the expected envelope or payload
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The envelope was written by a newer schema than this build reads
    #[error("Unknown schema version {found} (supported up to {supported})")]
    UnknownSchemaVersion { found: String, supported: String },

    /// Backend connectivity, timeout, or command failure
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Invalid request or checkpoint
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CheckpointError {
    /// Wrap an encoder failure
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }

    /// Wrap a decoder failure
    pub fn deserialization(err: impl std::fmt::Display) -> Self {
        Self::Deserialization(err.to_string())
    }

    /// True for stored data that failed to parse. Reads treat these as misses.
    pub fn is_dirty_data(&self) -> bool {
        matches!(self, Self::Deserialization(_))
    }
}
