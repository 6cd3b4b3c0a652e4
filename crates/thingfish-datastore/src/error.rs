use thiserror::Error;

/// Errors from datastore operations.
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// The write would push the store past its configured byte limit.
    #[error("quota exceeded: writing {requested} bytes would use {would_use} of {limit} bytes")]
    QuotaExceeded {
        requested: u64,
        would_use: u64,
        limit: u64,
    },

    /// The operation is not provided by this backend.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Bad or missing backend options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No backend is registered under the requested name.
    #[error("unknown datastore backend: {0}")]
    UnknownBackend(String),

    /// Internal failure such as a poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for datastore operations.
pub type Result<T> = std::result::Result<T, DatastoreError>;
