//! Declarative operation descriptors and the generic executor consumed by
//! generated operation layers.

use crate::client::Client;
use crate::error::Error;
use crate::headers::HttpHeaders;
use crate::request::{Method, PipelineRequest, PipelineResponse, RequestBody};
use crate::url_template::{PathParam, QueryParam, build_url};
use serde::Deserialize;

/// A declarative description of one REST operation: where it goes, how it
/// is sent, and which statuses count as success.
#[derive(Clone, Debug)]
pub struct OperationSpec {
    /// Path template with `{param}` placeholders, relative to the client
    /// endpoint.
    pub path: String,
    pub method: Method,
    /// Statuses whose body deserializes into the success type; any other
    /// status becomes a structured service error.
    pub expected_status_codes: Vec<u16>,
}

impl OperationSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            expected_status_codes: vec![200],
        }
    }

    pub fn with_expected_status_codes(mut self, codes: impl Into<Vec<u16>>) -> Self {
        self.expected_status_codes = codes.into();
        self
    }
}

/// Positional and named arguments for one invocation of an operation.
#[derive(Default)]
pub struct OperationArguments {
    pub path_params: Vec<PathParam>,
    pub query_params: Vec<(String, QueryParam)>,
    pub headers: HttpHeaders,
    pub body: Option<RequestBody>,
}

/// Executes an operation described by `spec` and deserializes the response
/// into `T`.
///
/// The URL is assembled from the client endpoint, the spec's path template,
/// and the arguments; `api-version` precedence follows the client rules. A
/// response outside the spec's expected statuses becomes an
/// [`Error::HttpResponse`] carrying the parsed service error envelope.
pub async fn send_operation_request<T: serde::de::DeserializeOwned>(
    client: &Client,
    args: OperationArguments,
    spec: &OperationSpec,
) -> Result<T, Error> {
    let url = build_url(
        client.endpoint(),
        &spec.path,
        &args.path_params,
        &args.query_params,
        client.api_version(),
        false,
    )?;

    let mut request = PipelineRequest::new(spec.method, url);
    request.headers = args.headers;
    request.body = args.body;
    request.allow_insecure_connection = client.allow_insecure_connection();

    let response = client.send_request(&mut request).await?;
    if !spec.expected_status_codes.contains(&response.status) {
        return Err(error_from_response(&response));
    }
    response.json()
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

/// Parses `code`/`message` from a service error payload, accepting both the
/// nested `{"error": {"code", "message"}}` envelope and the flat form.
pub(crate) fn parse_error_envelope(body: &[u8]) -> (Option<String>, Option<String>) {
    let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) else {
        return (None, None);
    };
    match envelope.error {
        Some(detail) => (detail.code, detail.message),
        None => (envelope.code, envelope.message),
    }
}

/// Converts a non-success response into a structured error, carrying the
/// service error envelope and request context for diagnostics.
pub(crate) fn error_from_response(response: &PipelineResponse) -> Error {
    let (code, message) = parse_error_envelope(&response.body);
    let message = message.unwrap_or_else(|| {
        let text = response.text();
        if text.is_empty() {
            format!("HTTP {}", response.status)
        } else {
            text
        }
    });
    Error::HttpResponse {
        status_code: response.status,
        url: response.request_url.clone(),
        code,
        message,
        request_id: response
            .headers
            .get("x-ms-request-id")
            .map(str::to_string),
    }
}
