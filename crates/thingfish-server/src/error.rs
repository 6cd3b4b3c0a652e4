use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thingfish_handler::{ErrorKind, HandlerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("datastore error: {0}")]
    Datastore(#[from] thingfish_datastore::DatastoreError),

    #[error("metastore error: {0}")]
    Metastore(#[from] thingfish_metastore::MetastoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::BadRequest(_) => ErrorKind::InvalidArgument,
            ServerError::Handler(e) => e.kind(),
            // Only raised while building backends at startup.
            ServerError::Datastore(_) | ServerError::Metastore(_) | ServerError::Config(_) => {
                ErrorKind::Configuration
            }
            ServerError::Io(_) | ServerError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NotFound => "not_found",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Configuration => "configuration",
            ErrorKind::NotImplemented => "not_implemented",
            ErrorKind::LockTimeout => "lock_timeout",
            ErrorKind::InvalidArgument => "bad_request",
            ErrorKind::Internal => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retryable = self.kind().is_retryable();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        let mut response = (status, Json(body)).into_response();
        if retryable {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
