//! Error types for campus-ledger
//!
//! This module provides the error handling for the library:
//! - [`FetchError`] - the outcome of a single failed page request
//! - [`Error`] - everything a caller of the crate can observe, with the
//!   offending page or credential shape attached where it matters
//! - machine-readable codes via [`Error::error_code`] for UI status lines

use crate::credentials::CredentialShape;
use thiserror::Error;

/// Result type alias for campus-ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single transaction-page request
///
/// Each variant fails the current page attempt. The fetcher never retries;
/// the probe's credential-shape fallback is the only place a second attempt
/// is made.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The portal answered with a status other than 200
    #[error("HTTP status {status}")]
    Http {
        /// The HTTP status code returned by the portal
        status: u16,
    },

    /// The body was not JSON, or was JSON without a `rows` list
    #[error("unexpected response: {0}")]
    BadResponse(String),

    /// Timeout, connection failure, or the body could not be read
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Main error type for campus-ledger
#[derive(Debug, Error)]
pub enum Error {
    /// The captured cookies do not contain a session id, so no request can be made
    #[error("no session: cookie {cookie} was not captured, log in first")]
    CredentialMissing {
        /// Name of the cookie that was expected
        cookie: &'static str,
    },

    /// The subject (card account) identifier is empty
    #[error("no subject account given")]
    MissingSubject,

    /// The requested page range cannot be retrieved
    #[error("invalid page range {start_page}..={end_page}: pages start at 1")]
    InvalidRange {
        /// Requested first page
        start_page: u32,
        /// Requested last page (0 = all pages)
        end_page: u32,
    },

    /// Every credential shape was rejected by the portal during the probe
    #[error("probe failed for every credential shape: {}", describe_attempts(.attempts))]
    ProbeFailed {
        /// The error returned for each shape, in the order they were tried
        attempts: Vec<(CredentialShape, FetchError)>,
    },

    /// A page failed during a retrieval run
    #[error("page {page} failed: {source}")]
    PageFailed {
        /// The page that could not be fetched
        page: u32,
        /// The underlying fetch failure
        source: FetchError,
    },

    /// A retrieval run is already in progress on this retriever
    #[error("retrieval run {run} is already in progress")]
    AlreadyRunning {
        /// Id of the active run
        run: u64,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "portal.base_url")
        key: Option<String>,
    },

    /// Export was requested with no records collected
    #[error("no records to export")]
    NothingToExport,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client could not be constructed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn describe_attempts(attempts: &[(CredentialShape, FetchError)]) -> String {
    if attempts.is_empty() {
        return "no shapes tried".to_string();
    }
    attempts
        .iter()
        .map(|(shape, err)| format!("{shape}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Machine-readable error code for status displays and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::CredentialMissing { .. } => "credential_missing",
            Error::MissingSubject => "missing_subject",
            Error::InvalidRange { .. } => "invalid_range",
            Error::ProbeFailed { .. } => "probe_failed",
            Error::PageFailed { .. } => "page_failed",
            Error::AlreadyRunning { .. } => "already_running",
            Error::Config { .. } => "config_error",
            Error::NothingToExport => "nothing_to_export",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Csv(_) => "csv_error",
            Error::Network(_) => "network_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether the error means the captured login is unusable
    ///
    /// UIs use this to tell the user to log in again rather than to retry.
    pub fn is_login_problem(&self) -> bool {
        matches!(
            self,
            Error::CredentialMissing { .. } | Error::ProbeFailed { .. }
        )
    }
}

impl FetchError {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            FetchError::Http { .. } => "http_status",
            FetchError::BadResponse(_) => "bad_response",
            FetchError::Transport(_) => "transport",
        }
    }
}
