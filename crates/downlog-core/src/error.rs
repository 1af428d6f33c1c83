//! Error types for log selection and archiving.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while selecting and archiving log files.
///
/// Every variant maps to one stage of a request: validation
/// (`MethodNotAllowed` through `UnknownCategory`), search (`NotFound`,
/// `SearchFailed`, `DownloadTooLarge`) or archive construction
/// (`ArchiveFailed`).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request used a method other than POST.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The request body exceeded the accepted size.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Maximum accepted body size in bytes.
        limit: usize,
    },

    /// The request body or selector was malformed.
    #[error("{code}: {detail}")]
    InvalidRequest {
        /// Short machine-readable reason (`invalid_json`, `invalid_request`).
        code: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// The timestamp was missing or not RFC3339.
    #[error("timestamp must be RFC3339, e.g. 2026-01-23T11:07:00+03:00: {0}")]
    InvalidTimestamp(String),

    /// No log category is registered under the requested name.
    #[error("unknown log category: {0}")]
    UnknownCategory(String),

    /// The search succeeded but nothing matched.
    #[error("no log files found: {0}")]
    NotFound(String),

    /// The matched entries are larger than the configured download limit.
    #[error("matched logs total {size} bytes, limit is {limit} bytes")]
    DownloadTooLarge {
        /// Total size of the matched entries in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// Walking the log tree failed.
    #[error("search failed at {}: {source}", path.display())]
    SearchFailed {
        /// Path at which traversal failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Reading a matched entry or writing the archive failed.
    #[error("archive failed at {}: {source}", path.display())]
    ArchiveFailed {
        /// Entry being archived when the failure occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Internal failure not attributable to the request.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Malformed, oversized-field or trailing-content JSON.
    pub fn invalid_json(detail: impl Into<String>) -> Self {
        Self::InvalidRequest {
            code: "invalid_json",
            detail: detail.into(),
        }
    }

    /// Well-formed JSON carrying an unusable selector.
    pub fn invalid_selector(detail: impl Into<String>) -> Self {
        Self::InvalidRequest {
            code: "invalid_request",
            detail: detail.into(),
        }
    }

    /// Traversal failure at `path`.
    pub fn search(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::SearchFailed {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Archive failure while handling `path`.
    pub fn archive(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::ArchiveFailed {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Machine-readable error kind, used as the `error` field of API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidRequest { code, .. } => *code,
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::UnknownCategory(_) => "unknown_category",
            Self::NotFound(_) => "not_found",
            Self::DownloadTooLarge { .. } => "download_too_large",
            Self::SearchFailed { .. } => "search_failed",
            Self::ArchiveFailed { .. } => "archive_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the failure was caused by the caller rather than the host.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::SearchFailed { .. } | Self::ArchiveFailed { .. } | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = FetchError::MethodNotAllowed("GET".to_string());
        assert_eq!(err.to_string(), "method not allowed: GET");

        let err = FetchError::PayloadTooLarge { limit: 1024 };
        assert_eq!(err.to_string(), "request body exceeds 1024 bytes");

        let err = FetchError::invalid_json("unexpected extra JSON content");
        assert_eq!(err.to_string(), "invalid_json: unexpected extra JSON content");

        let err = FetchError::UnknownCategory("nginx".to_string());
        assert_eq!(err.to_string(), "unknown log category: nginx");
    }

    #[test]
    fn test_io_variants_carry_path_and_source() {
        let err = FetchError::search(
            "/var/log/app",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "search failed at /var/log/app: denied");
        assert!(std::error::Error::source(&err).is_some());

        let err = FetchError::archive(
            "/var/log/app/x.log",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/var/log/app/x.log"));
    }

    #[test]
    fn test_codes_distinguish_request_faults() {
        assert_eq!(FetchError::invalid_json("x").code(), "invalid_json");
        assert_eq!(FetchError::invalid_selector("x").code(), "invalid_request");
        assert_eq!(
            FetchError::InvalidTimestamp(String::new()).code(),
            "invalid_timestamp"
        );
        assert_eq!(FetchError::NotFound("x".into()).code(), "not_found");
    }

    #[test]
    fn test_client_and_server_errors() {
        assert!(FetchError::NotFound("x".into()).is_client_error());
        assert!(FetchError::DownloadTooLarge { size: 2, limit: 1 }.is_client_error());
        assert!(!FetchError::Internal("x".into()).is_client_error());
        assert!(
            !FetchError::archive("x", io::Error::other("boom")).is_client_error()
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<FetchError>();
    }
}
