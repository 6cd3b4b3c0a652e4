use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id {input:?}: {reason}")]
    InvalidOid { input: String, reason: String },

    #[error("unsupported property value: {0}")]
    UnsupportedValue(String),
}
