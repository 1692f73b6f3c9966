//! Request and response types carried through the pipeline.

use crate::error::Error;
use crate::headers::HttpHeaders;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// HTTP methods supported by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload, discriminated by kind.
///
/// Callers pick the variant explicitly instead of the runtime inspecting
/// argument shapes; the transport derives `Content-Type` from it when the
/// caller has not set one.
#[derive(Clone, Debug)]
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
    Binary(Vec<u8>),
}

impl RequestBody {
    /// Raw bytes for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        match self {
            RequestBody::Text(text) => Ok(text.clone().into_bytes()),
            RequestBody::Json(value) => {
                serde_json::to_vec(value).map_err(|e| Error::Deserialization {
                    reason: format!("failed to serialize request body: {e}"),
                })
            }
            RequestBody::Binary(bytes) => Ok(bytes.clone()),
        }
    }

    /// Default `Content-Type` for this payload kind.
    pub fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Text(_) => "text/plain; charset=utf-8",
            RequestBody::Json(_) => "application/json",
            RequestBody::Binary(_) => "application/octet-stream",
        }
    }
}

/// A request in transit through the pipeline.
///
/// The URL is held as a pre-assembled string so that reserved-character
/// passthrough and caller-encoded query strings survive byte-for-byte.
/// The pipeline owns the request exclusively while it is in flight; policies
/// mutate it through the chain, one at a time.
#[derive(Clone, Debug)]
pub struct PipelineRequest {
    pub method: Method,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Option<RequestBody>,
    /// Permit TLS connections with invalid certificates. Off by default.
    pub allow_insecure_connection: bool,
    /// The caller asserts the URL is already fully encoded.
    pub skip_url_encoding: bool,
    pub timeout: Option<Duration>,
    /// Cooperative cancellation; observed between retry attempts and while
    /// waiting on the transport.
    pub abort: Option<CancellationToken>,
}

impl PipelineRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HttpHeaders::new(),
            body: None,
            allow_insecure_connection: false,
            skip_url_encoding: false,
            timeout: None,
            abort: None,
        }
    }

    /// Whether the caller's abort signal has fired.
    pub fn is_aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(|token| token.is_cancelled())
    }
}

/// A response produced by the transport, immutable once constructed.
#[derive(Clone, Debug)]
pub struct PipelineResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
    /// Method of the originating request, for diagnostics.
    pub request_method: Method,
    /// URL the request was dispatched to, after all policy rewrites.
    pub request_url: String,
}

impl PipelineResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON into `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Deserialization {
            reason: format!("invalid JSON from {}: {e}", self.request_url),
        })
    }

    /// Converts a non-success response into a structured [`Error`],
    /// parsing the service error envelope when one is present.
    pub fn error_for_status(self) -> Result<PipelineResponse, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(crate::operation::error_from_response(&self))
        }
    }
}
