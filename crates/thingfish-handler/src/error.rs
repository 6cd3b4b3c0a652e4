use thingfish_datastore::DatastoreError;
use thingfish_metastore::MetastoreError;
use thingfish_types::Oid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// The object is in neither store.
    #[error("object not found: {0}")]
    NotFound(Oid),

    #[error("quota exceeded: {requested} bytes requested, limit is {limit}")]
    QuotaExceeded { requested: u64, limit: u64 },

    /// The blob and its properties could not be kept in step.
    #[error("integrity error for {oid}: {reason}")]
    Integrity { oid: Oid, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    #[error(transparent)]
    Metastore(#[from] MetastoreError),
}

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Coarse classification of a [`HandlerError`], one per response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    QuotaExceeded,
    Integrity,
    Configuration,
    NotImplemented,
    LockTimeout,
    InvalidArgument,
    Internal,
}

impl ErrorKind {
    /// The HTTP status code this kind is reported as.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::QuotaExceeded => 413,
            ErrorKind::Integrity => 500,
            ErrorKind::Configuration => 500,
            ErrorKind::NotImplemented => 500,
            ErrorKind::LockTimeout => 503,
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether the same request may succeed if repeated unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::LockTimeout)
    }
}

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::NotFound(_) => ErrorKind::NotFound,
            HandlerError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            HandlerError::Integrity { .. } => ErrorKind::Integrity,
            HandlerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            HandlerError::Datastore(e) => match e {
                DatastoreError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
                DatastoreError::NotImplemented(_) => ErrorKind::NotImplemented,
                DatastoreError::Configuration(_) | DatastoreError::UnknownBackend(_) => {
                    ErrorKind::Configuration
                }
                DatastoreError::Internal(_) | DatastoreError::Io(_) => ErrorKind::Internal,
            },
            HandlerError::Metastore(e) => match e {
                MetastoreError::NotImplemented(_) => ErrorKind::NotImplemented,
                MetastoreError::Configuration(_) | MetastoreError::UnknownBackend(_) => {
                    ErrorKind::Configuration
                }
                MetastoreError::LockTimeout { .. } => ErrorKind::LockTimeout,
                MetastoreError::InvalidPattern { .. } => ErrorKind::InvalidArgument,
                MetastoreError::Serialization(_)
                | MetastoreError::Internal(_)
                | MetastoreError::Io(_) => ErrorKind::Internal,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn kinds_map_to_statuses() {
        let oid = Oid::generate();
        let cases: Vec<(HandlerError, u16)> = vec![
            (HandlerError::NotFound(oid), 404),
            (HandlerError::QuotaExceeded { requested: 10, limit: 5 }, 413),
            (
                DatastoreError::QuotaExceeded { requested: 10, would_use: 10, limit: 5 }.into(),
                413,
            ),
            (HandlerError::Integrity { oid, reason: "x".into() }, 500),
            (DatastoreError::Configuration("x".into()).into(), 500),
            (MetastoreError::NotImplemented("x".into()).into(), 500),
            (
                MetastoreError::LockTimeout {
                    path: PathBuf::from("metastore.lock"),
                    waited: Duration::from_secs(5),
                }
                .into(),
                503,
            ),
            (HandlerError::InvalidArgument("x".into()), 400),
        ];
        for (err, status) in cases {
            assert_eq!(err.kind().http_status(), status, "{err}");
        }
    }

    #[test]
    fn only_lock_timeouts_are_retryable() {
        assert!(ErrorKind::LockTimeout.is_retryable());
        assert!(!ErrorKind::QuotaExceeded.is_retryable());
        assert!(!ErrorKind::Internal.is_retryable());
    }
}
