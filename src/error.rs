//! Error types for folio-dl
//!
//! This module provides the error taxonomy of the library:
//! - Domain-specific error types (fetch, assembly, admission, cipher)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::{DownloadId, PageIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for folio-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for folio-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.max_attempts")
        key: Option<String>,
    },

    /// A download request was rejected before any work started
    #[error("{0}")]
    Admission(#[from] AdmissionError),

    /// A page could not be fetched
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The output document could not be built
    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Decryption key could not be derived
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// The download was stopped by its owner or by shutdown
    #[error("download {id} was stopped")]
    Stopped {
        /// The download that was stopped
        id: DownloadId,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Reasons a download request is refused at admission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Another download already holds the session slot
    #[error("download_in_progress: download {active} is already in flight")]
    DownloadInProgress {
        /// The download currently holding the slot
        active: DownloadId,
    },

    /// The page range is empty or starts below page 1
    #[error("invalid page range {start}..={end}: pages are 1-based and start must not exceed end")]
    InvalidRange {
        /// Requested first page
        start: PageIndex,
        /// Requested last page
        end: PageIndex,
    },

    /// The image container needs a decryption key and the request carried none
    #[error("decryption key not found: {reason}")]
    MissingCredential {
        /// What was wrong with the credential
        reason: String,
    },

    /// The reservation is no longer pending (expired, stopped or already started)
    #[error("reservation {id} is no longer pending")]
    ReservationExpired {
        /// The reservation's download ID
        id: DownloadId,
    },
}

/// Page fetch errors
///
/// Every variant except [`Cancelled`](FetchError::Cancelled),
/// [`NoAuthToken`](FetchError::NoAuthToken) and [`Exhausted`](FetchError::Exhausted) describes a
/// single failed attempt and is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, reset)
    #[error("network failure: {0}")]
    Network(String),

    /// Reader answered with a non-success status
    #[error("server returned HTTP {status}")]
    Http {
        /// HTTP status code
        status: u16,
    },

    /// Reader answered with an empty body
    #[error("empty response body")]
    EmptyResponse,

    /// Body is not well-formed markup
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Body has no usable payload element
    #[error("expected element <{element}> is missing or empty")]
    MissingElement {
        /// Name of the expected element
        element: &'static str,
    },

    /// The session bridge failed to produce a token for this attempt
    #[error("authorization failed: {0}")]
    Auth(String),

    /// No token source is configured at all
    #[error("no authorization token available")]
    NoAuthToken,

    /// All attempts for a page failed
    #[error("page {page} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// The page that could not be fetched
        page: PageIndex,
        /// Number of attempts made
        attempts: u32,
        /// Message of the final failed attempt
        last_error: String,
    },

    /// The download was abandoned while the page was being fetched
    #[error("fetch cancelled")]
    Cancelled,
}

/// Document assembly errors
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// A page or finalize command arrived before `init`
    #[error("assembly was not initialized")]
    NotInitialized,

    /// `init` arrived while a document was already being assembled
    #[error("assembly is already initialized")]
    AlreadyInitialized,

    /// The image container was initialized without a decryption key
    #[error("decryption key not found")]
    MissingKey,

    /// A page could not be rendered into the document
    #[error("failed to render page {page}: {reason}")]
    Render {
        /// The page that failed
        page: PageIndex,
        /// Why it failed
        reason: String,
    },

    /// Zip container error
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The document grew past the configured memory budget
    #[error("document exceeds the {limit} byte budget ({attempted} bytes)")]
    BudgetExceeded {
        /// Configured limit
        limit: u64,
        /// Size the document would have reached
        attempted: u64,
    },

    /// The assembly worker went away before producing a result
    #[error("assembly aborted: {0}")]
    Aborted(String),

    /// I/O error while writing the container
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decryption key errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// The credential has no numeric prefix before `:`
    #[error("credential has no numeric key prefix")]
    EmptyKey,

    /// The key prefix contains something other than decimal digits
    #[error("key contains non-digit character {0:?}")]
    NonDigitKey(char),
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "download_in_progress",
///     "message": "download_in_progress: download 3 is already in flight",
///     "details": {
///       "active_download_id": 3
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "download_in_progress", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - invalid input
            Error::Config { .. } => 400,
            Error::Cipher(_) => 400,
            Error::Admission(AdmissionError::InvalidRange { .. }) => 400,
            Error::Admission(AdmissionError::MissingCredential { .. }) => 400,

            // 409 Conflict - the slot is taken or the download was torn down
            Error::Admission(AdmissionError::DownloadInProgress { .. }) => 409,
            Error::Stopped { .. } => 409,
            Error::Fetch(FetchError::Cancelled) => 409,

            // 410 Gone - the reservation lapsed
            Error::Admission(AdmissionError::ReservationExpired { .. }) => 410,

            // 413 Payload Too Large
            Error::Assembly(AssemblyError::BudgetExceeded { .. }) => 413,

            // 422 Unprocessable Entity - the pages could not be turned into a document
            Error::Assembly(_) => 422,

            // 502 Bad Gateway - the reader misbehaved
            Error::Fetch(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Admission(e) => match e {
                AdmissionError::DownloadInProgress { .. } => "download_in_progress",
                AdmissionError::InvalidRange { .. } => "invalid_range",
                AdmissionError::MissingCredential { .. } => "missing_credential",
                AdmissionError::ReservationExpired { .. } => "reservation_expired",
            },
            Error::Fetch(e) => match e {
                FetchError::Exhausted { .. } => "fetch_exhausted",
                FetchError::NoAuthToken => "no_auth_token",
                FetchError::Cancelled => "cancelled",
                _ => "fetch_error",
            },
            Error::Assembly(e) => match e {
                AssemblyError::BudgetExceeded { .. } => "document_too_large",
                AssemblyError::MissingKey => "missing_credential",
                AssemblyError::Render { .. } => "render_failed",
                _ => "assembly_error",
            },
            Error::Cipher(_) => "invalid_key",
            Error::Stopped { .. } => "stopped",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Admission(AdmissionError::DownloadInProgress { active }) => {
                Some(serde_json::json!({ "active_download_id": active }))
            }
            Error::Admission(AdmissionError::InvalidRange { start, end }) => {
                Some(serde_json::json!({ "range_start": start, "range_end": end }))
            }
            Error::Admission(AdmissionError::ReservationExpired { id }) | Error::Stopped { id } => {
                Some(serde_json::json!({ "download_id": id }))
            }
            Error::Fetch(FetchError::Exhausted { page, attempts, .. }) => {
                Some(serde_json::json!({ "page": page, "attempts": attempts }))
            }
            Error::Assembly(AssemblyError::Render { page, .. }) => {
                Some(serde_json::json!({ "page": page }))
            }
            Error::Assembly(AssemblyError::BudgetExceeded { limit, attempted }) => {
                Some(serde_json::json!({ "limit_bytes": limit, "attempted_bytes": attempted }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
