//! Error taxonomy raised by [`crate::transport`].

use thiserror::Error;

/// Raw error surfaced by a Transport attempt. Only the [`ErrorKind`]
/// classification and a rendered message ever reach
/// `DownloadTask::error_message`; this type (and its `source()`) stays in
/// the logs.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no reachable network")]
    NetworkUnavailable,
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("server resource changed since resume token was issued")]
    ValidatorChanged,
    #[error("disk full writing {path}")]
    DiskFull { path: String },
    #[error("disk i/o error: {0}")]
    DiskIo(String),
    #[error("stored resume token rejected: {0}")]
    InvalidResumeData(String),
    #[error("cancelled by caller")]
    Cancelled,
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

/// High-level classification used by [`crate::retry::policy::RetryPolicy`]
/// to decide whether (and how) to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No network path; transient.
    NetworkUnavailable,
    /// TCP reset or mid-stream timeout; transient.
    ConnectionLost,
    /// Retryable HTTP status: 408, 429, 5xx.
    HttpTransient { status: u16, retry_after: Option<u64> },
    /// Non-retryable HTTP status: any other 4xx.
    HttpPermanent { status: u16 },
    /// Resume attempted but the server's validator (ETag/Last-Modified)
    /// changed; handled specially (reset-once) by the policy.
    ValidatorChanged,
    /// Local write failure (disk full, permission denied); never retried.
    LocalIo,
    /// Stored resume token failed validation; never retried (falls back to
    /// a fresh download instead).
    InvalidResumeData,
    /// User-initiated stop; never retried.
    Cancelled,
    /// Programming error; reported but never retried.
    InternalInvariant,
}

pub fn classify(err: &TransportError) -> ErrorKind {
    match err {
        TransportError::NetworkUnavailable => ErrorKind::NetworkUnavailable,
        TransportError::ConnectionLost(_) => ErrorKind::ConnectionLost,
        TransportError::Http { status, message } => classify_http(*status, message),
        TransportError::ValidatorChanged => ErrorKind::ValidatorChanged,
        TransportError::DiskFull { .. } | TransportError::DiskIo(_) => ErrorKind::LocalIo,
        TransportError::InvalidResumeData(_) => ErrorKind::InvalidResumeData,
        TransportError::Cancelled => ErrorKind::Cancelled,
        TransportError::InternalInvariant(_) => ErrorKind::InternalInvariant,
    }
}

fn classify_http(status: u16, message: &str) -> ErrorKind {
    match status {
        408 | 429 => ErrorKind::HttpTransient {
            status,
            retry_after: parse_retry_after(message),
        },
        500..=599 => ErrorKind::HttpTransient {
            status,
            retry_after: None,
        },
        _ => ErrorKind::HttpPermanent { status },
    }
}

/// Best-effort extraction of a `Retry-After: <seconds>` hint that callers
/// may fold into the error message (e.g. `"429 Too Many Requests (retry
/// after 30)"`). Not a full HTTP-date parser — only the delta-seconds form.
fn parse_retry_after(message: &str) -> Option<u64> {
    message
        .split("retry after ")
        .nth(1)
        .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
        .and_then(|digits| digits.parse().ok())
}
