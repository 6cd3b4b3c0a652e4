//! Error types for metastore operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during metastore operations.
#[derive(Debug, Error)]
pub enum MetastoreError {
    /// The operation is not provided by this backend.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Bad or missing backend options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No backend is registered under the requested name.
    #[error("unknown metastore backend: {0}")]
    UnknownBackend(String),

    /// The store's lock file could not be acquired in time. Retryable.
    #[error("timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// A search pattern could not be compiled.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal failure such as a poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error during file-based operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for metastore operations.
pub type Result<T> = std::result::Result<T, MetastoreError>;
