//! Error types for the scan2text library.
//!
//! Failures are layered so that each one stops exactly as much work as it has
//! to and no more:
//!
//! * [`BatchError`]: **Fatal** for the whole run: the input directory is
//!   missing, the output directory cannot be created, the configuration is
//!   invalid. Returned as `Err(BatchError)` from [`crate::batch::run`].
//!
//! * [`PageSourceError`]: a single document could not be turned into page
//!   images. The document is reported as a hard failure and the batch moves
//!   on to the next one.
//!
//! * [`OcrError`]: a single OCR attempt failed. The dispatcher retries the
//!   retryable ones and records a failed page once attempts run out; it never
//!   escalates to the document.
//!
//! * [`PersistenceError`]: the artifact could not be written durably. The
//!   document is not marked complete and is picked up again on the next run.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort a batch run before or outside per-document work.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Input directory does not exist.
    #[error("Input directory not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// Input path exists but is not a directory.
    #[error("Input path is not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// Output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walking the input directory failed.
    #[error("Failed to read '{path}': {source}")]
    DiscoveryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Copying a file during consolidation failed.
    #[error("Failed to copy '{from}' to '{to}': {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured OCR provider could not be constructed.
    #[error("OCR provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while converting one document into page images.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageSourceError {
    /// The document type is not one the page source can rasterise.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The document could not be read or rasterised.
    #[error("conversion failed: {0}")]
    ConversionError(String),
}

/// A failed OCR attempt for a single page.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OcrError {
    /// The call did not finish within the configured timeout.
    #[error("timed out after {}", human_millis(.ms))]
    Timeout { ms: u64 },

    /// Connection refused, reset, DNS failure and friends.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {body}")]
    ServiceError { status: u16, body: String },

    /// The service answered 2xx but the body had no usable text.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl OcrError {
    pub fn timeout(after: std::time::Duration) -> Self {
        OcrError::Timeout {
            ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether another attempt with the same image can plausibly succeed.
    ///
    /// Client errors (malformed request, bad credentials) will fail the same
    /// way every time, except for 408 and 429 which are load related.
    pub fn is_retryable(&self) -> bool {
        match self {
            OcrError::Timeout { .. } | OcrError::Transport(_) | OcrError::InvalidResponse(_) => true,
            OcrError::ServiceError { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
        }
    }
}

/// `60000` → `60s`, `1500` → `1500ms`.
fn human_millis(ms: &u64) -> String {
    if *ms >= 1000 && ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

/// The artifact for a document could not be durably written.
#[derive(Debug, Error)]
#[error("Failed to persist artifact '{path}': {source}")]
pub struct PersistenceError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl PersistenceError {
    pub(crate) fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(OcrError::Timeout { ms: 30_000 }.is_retryable());
        assert!(OcrError::Transport("connection reset".into()).is_retryable());
        assert!(OcrError::InvalidResponse("no choices".into()).is_retryable());
        assert!(OcrError::ServiceError {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(OcrError::ServiceError {
            status: 429,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        for status in [400, 401, 403, 404, 413, 422] {
            let e = OcrError::ServiceError {
                status,
                body: "bad request".into(),
            };
            assert!(!e.is_retryable(), "status {status} must not be retried");
        }
    }

    #[test]
    fn service_error_display() {
        let e = OcrError::ServiceError {
            status: 400,
            body: "image too large".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("400"), "got: {msg}");
        assert!(msg.contains("image too large"), "got: {msg}");
    }

    #[test]
    fn persistence_error_display() {
        let e = PersistenceError::new(
            "/out/a.pdf.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(e.to_string().contains("/out/a.pdf.txt"));
    }

    #[test]
    fn timeout_message_keeps_sub_second_precision() {
        use std::time::Duration;
        assert_eq!(OcrError::timeout(Duration::from_secs(60)).to_string(), "timed out after 60s");
        assert_eq!(OcrError::timeout(Duration::from_millis(250)).to_string(), "timed out after 250ms");
        assert_eq!(OcrError::timeout(Duration::from_millis(1500)).to_string(), "timed out after 1500ms");
    }
}
