//! Error types for the connect client.
//!
//! Every failure the client can produce is one variant of [`Error`]. The
//! [`classify`] function maps a non-success HTTP status and its body onto
//! that set; the request executor calls it for every status it does not
//! retry.

use std::time::Duration;

use thiserror::Error;

use crate::models::{ApiErrorEntry, ErrorDocument};

/// A specialized `Result` type for connect client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for all connect client operations.
///
/// A call either returns data or exactly one of these. Each variant carries
/// enough detail (status code, server message) for a caller to decide whether
/// to retry without re-reading the raw response.
#[derive(Error, Debug)]
pub enum Error {
    /// The request target could not be turned into a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Transport failure, timeout, or a body that could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Non-success status without a structured error body.
    #[error("HTTP error: status={status}")]
    Http {
        /// HTTP status code
        status: u16,
    },

    /// Non-success status with a structured `errors` body.
    #[error("API error: status={status}, message={message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Entry descriptions joined with `"; "`
        message: String,
        /// The decoded error entries
        errors: Vec<ApiErrorEntry>,
    },

    /// The service kept answering 429 after every allowed retry.
    #[error("Rate limited; retry budget exhausted")]
    RateLimited {
        /// The last server-directed wait, if one was sent
        retry_after: Option<Duration>,
    },

    /// A required input was not supplied.
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// The private key could not be loaded or a token could not be signed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status } | Error::Api { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Returns `true` if this error is potentially transient and the
    /// operation could be retried later.
    ///
    /// # Example
    ///
    /// ```
    /// use connect_core::Error;
    ///
    /// let err = Error::RateLimited { retry_after: None };
    /// assert!(err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::InvalidResponse(_) | Error::RateLimited { .. } => true,
            Error::Http { status } | Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is an authentication-related error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Signing(_)) || matches!(self.status(), Some(401 | 403))
    }

    /// Returns `true` if this error indicates a client-side issue.
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::Http { status } | Error::Api { status, .. } => (400..500).contains(status),
            Error::InvalidUrl(_) | Error::MissingParameter(_) | Error::Config(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if this error indicates a server-side issue.
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(status) if status >= 500)
    }
}

/// Map a failed response onto an [`Error`].
///
/// `429` is always [`Error::RateLimited`]. Any other status whose body decodes
/// as an `errors` document with at least one entry becomes [`Error::Api`];
/// everything else is [`Error::Http`]. Success statuses never reach this
/// function.
///
/// # Example
///
/// ```
/// use connect_core::{classify, Error};
///
/// let body = br#"{"errors":[{"title":"Bad","detail":"oops"}]}"#;
/// match classify(403, body) {
///     Error::Api { status, message, .. } => {
///         assert_eq!(status, 403);
///         assert_eq!(message, "Bad: oops");
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub fn classify(status: u16, body: &[u8]) -> Error {
    if status == 429 {
        return Error::RateLimited { retry_after: None };
    }

    match serde_json::from_slice::<ErrorDocument>(body) {
        Ok(document) if !document.errors.is_empty() => {
            let message = document
                .errors
                .iter()
                .map(ApiErrorEntry::description)
                .collect::<Vec<_>>()
                .join("; ");
            Error::Api {
                status,
                message,
                errors: document.errors,
            }
        }
        _ => Error::Http { status },
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Error::InvalidUrl(err.to_string())
        } else if err.is_timeout() {
            Error::InvalidResponse(format!("request timed out: {err}"))
        } else {
            Error::InvalidResponse(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidResponse(format!("JSON decode failed: {err}"))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}
