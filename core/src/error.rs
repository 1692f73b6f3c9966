use crate::lro::OperationStatus;
use crate::pipeline::PipelineError;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the HTTP runtime.
///
/// The taxonomy separates failures by where they can be handled:
///
/// - [`Transport`] and [`Timeout`] are transient and eligible for retry.
/// - [`HttpResponse`] carries the service-reported error envelope for a
///   non-success status code, plus the request context needed to diagnose it.
/// - [`Pipeline`] wraps configuration errors raised when mutating a
///   [`Pipeline`](crate::pipeline::Pipeline); these never surface at request
///   time.
/// - [`OperationFailed`] is the terminal outcome of a long-running operation
///   that ended as `Failed` or `Canceled`.
///
/// [`Transport`]: Error::Transport
/// [`Timeout`]: Error::Timeout
/// [`HttpResponse`]: Error::HttpResponse
/// [`Pipeline`]: Error::Pipeline
/// [`OperationFailed`]: Error::OperationFailed
#[derive(Debug, Error)]
pub enum Error {
    /// The request never produced an HTTP response (DNS, connection, TLS).
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The request exceeded its time budget.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The caller's abort signal fired before the operation completed.
    #[error("operation aborted before completion")]
    Aborted,

    /// The service answered with a non-success status code.
    #[error("service returned HTTP {status_code} for {url}: {message}")]
    HttpResponse {
        status_code: u16,
        url: String,
        /// Service error code parsed from the error envelope, when present.
        code: Option<String>,
        message: String,
        /// `x-ms-request-id` echoed by the service, for support tickets.
        request_id: Option<String>,
    },

    /// A long-running operation reached a terminal `Failed` or `Canceled`
    /// state. Raised by `poll_until_done`, never by a single `poll`.
    #[error("long-running operation ended as {status:?}: {message}")]
    OperationFailed {
        status: OperationStatus,
        code: Option<String>,
        message: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("failed to decode response body: {reason}")]
    Deserialization { reason: String },

    /// Invalid client or request configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// This operation's wire protocol has no page-size knob.
    #[error("max_page_size is not supported by this operation")]
    MaxPageSizeUnsupported,

    /// Pipeline mutation error, raised when policies are added or removed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl Error {
    /// Whether the retry policy may swallow this error and try again.
    ///
    /// Only failures that never reached the service (or never produced a
    /// response) are transient; everything else propagates immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Timeout { .. })
    }

    /// Status code of the failing response, when one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::HttpResponse { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let transport = Error::Transport {
            url: "https://example.org".into(),
            reason: "connection refused".into(),
        };
        let timeout = Error::Timeout {
            url: "https://example.org".into(),
            timeout: Duration::from_secs(30),
        };
        let http = Error::HttpResponse {
            status_code: 409,
            url: "https://example.org".into(),
            code: Some("Conflict".into()),
            message: "already exists".into(),
            request_id: None,
        };

        assert!(transport.is_transient());
        assert!(timeout.is_transient());
        assert!(!http.is_transient());
        assert!(!Error::Aborted.is_transient());
    }

    #[test]
    fn status_code_accessor() {
        let http = Error::HttpResponse {
            status_code: 503,
            url: "https://example.org".into(),
            code: None,
            message: "unavailable".into(),
            request_id: Some("abc-123".into()),
        };
        assert_eq!(http.status_code(), Some(503));
        assert_eq!(Error::Aborted.status_code(), None);
    }
}
