//! Error types for the HTTP layer.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use downlog_core::FetchError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for server startup and lifecycle operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while configuring or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// The listen address could not be parsed.
    #[error("invalid listen address {0:?}: {1}")]
    InvalidListenAddr(String, String),

    /// Only one of the TLS certificate and key was provided.
    #[error("TLS needs both a certificate and a key (cert: {cert:?}, key: {key:?})")]
    IncompleteTls {
        /// Certificate path, if given.
        cert: Option<PathBuf>,
        /// Key path, if given.
        key: Option<PathBuf>,
    },

    /// The TLS certificate or key could not be loaded.
    #[error("failed to load TLS material: {0}")]
    Tls(std::io::Error),

    /// The server stopped with an error.
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// A [`FetchError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub FetchError);

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            FetchError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            FetchError::PayloadTooLarge { .. } | FetchError::DownloadTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            FetchError::InvalidRequest { .. } | FetchError::InvalidTimestamp(_) => {
                StatusCode::BAD_REQUEST
            }
            FetchError::UnknownCategory(_) | FetchError::NotFound(_) => StatusCode::NOT_FOUND,
            FetchError::SearchFailed { .. }
            | FetchError::ArchiveFailed { .. }
            | FetchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.0.code(),
            message: self.0.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        let mut response = (status, [("content-type", "application/json")], json).into_response();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            response
                .headers_mut()
                .insert("allow", axum::http::HeaderValue::from_static("POST"));
        }
        response
    }
}
