//! The wire boundary: pluggable transports that turn a finalized
//! [`PipelineRequest`] into a [`PipelineResponse`].

use crate::error::Error;
use crate::headers::HttpHeaders;
use crate::request::{Method, PipelineRequest, PipelineResponse};
use async_trait::async_trait;
use once_cell::sync::{Lazy, OnceCell};
use std::sync::Arc;

/// Sends a finalized request over the wire.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &PipelineRequest) -> Result<PipelineResponse, Error>;
}

/// The process-wide default transport, constructed lazily and shared.
///
/// This is a convenience for callers that do not care about transport
/// configuration; the client builder always accepts an explicit transport,
/// which takes precedence.
pub fn default_transport() -> Arc<dyn HttpClient> {
    static DEFAULT: Lazy<Arc<ReqwestTransport>> = Lazy::new(|| Arc::new(ReqwestTransport::new()));
    DEFAULT.clone()
}

/// Transport backed by [`reqwest`].
pub struct ReqwestTransport {
    client: reqwest::Client,
    // Built only when a request opts into insecure connections.
    insecure_client: OnceCell<reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            insecure_client: OnceCell::new(),
        }
    }

    fn client_for(&self, request: &PipelineRequest) -> Result<&reqwest::Client, Error> {
        if !request.allow_insecure_connection {
            return Ok(&self.client);
        }
        self.insecure_client.get_or_try_init(|| {
            reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))
        })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

#[async_trait]
impl HttpClient for ReqwestTransport {
    async fn send(&self, request: &PipelineRequest) -> Result<PipelineResponse, Error> {
        let client = self.client_for(request)?;
        let mut builder = client.request(to_reqwest_method(request.method), request.url.as_str());

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            if !request.headers.contains("content-type") {
                builder = builder.header("content-type", body.content_type());
            }
            builder = builder.body(body.to_bytes()?);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let pending = builder.send();
        let result = match &request.abort {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(Error::Aborted),
                    result = pending => result,
                }
            }
            None => pending.await,
        };
        let response = result.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    url: request.url.clone(),
                    timeout: request.timeout.unwrap_or_default(),
                }
            } else {
                Error::Transport {
                    url: request.url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = HttpHeaders::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.set(name.as_str(), value);
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport {
                url: request.url.clone(),
                reason: format!("failed to read response body: {e}"),
            })?
            .to_vec();

        Ok(PipelineResponse {
            status,
            headers,
            body,
            request_method: request.method,
            request_url: request.url.clone(),
        })
    }
}

/// Scripted transport for tests: replays queued responses and records every
/// request it receives.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One scripted response.
    #[derive(Clone, Debug)]
    pub struct MockResponse {
        pub status: u16,
        pub headers: HttpHeaders,
        pub body: Vec<u8>,
    }

    impl MockResponse {
        pub fn new(status: u16) -> Self {
            Self {
                status,
                headers: HttpHeaders::new(),
                body: Vec::new(),
            }
        }

        pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
            self.headers.set(name, value);
            self
        }

        pub fn with_json(mut self, value: serde_json::Value) -> Self {
            self.headers.set("content-type", "application/json");
            self.body = value.to_string().into_bytes();
            self
        }

        pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
            self.body = body.into();
            self
        }
    }

    /// A request observed by the mock, captured before the response was
    /// produced.
    #[derive(Clone, Debug)]
    pub struct RecordedRequest {
        pub method: Method,
        pub url: String,
        pub headers: HttpHeaders,
        pub body: Option<Vec<u8>>,
        pub allow_insecure_connection: bool,
    }

    #[derive(Default)]
    pub struct MockTransport {
        script: Mutex<VecDeque<MockResponse>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a transport that answers the given responses in order.
        pub fn with_responses(responses: impl IntoIterator<Item = MockResponse>) -> Self {
            let transport = Self::new();
            for response in responses {
                transport.enqueue(response);
            }
            transport
        }

        pub fn enqueue(&self, response: MockResponse) {
            self.script
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push_back(response);
        }

        /// Requests received so far, in arrival order.
        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .len()
        }
    }

    #[async_trait]
    impl HttpClient for MockTransport {
        async fn send(&self, request: &PipelineRequest) -> Result<PipelineResponse, Error> {
            let body = match &request.body {
                Some(body) => Some(body.to_bytes()?),
                None => None,
            };
            self.requests
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(RecordedRequest {
                    method: request.method,
                    url: request.url.clone(),
                    headers: request.headers.clone(),
                    body,
                    allow_insecure_connection: request.allow_insecure_connection,
                });

            let scripted = self
                .script
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front();
            match scripted {
                Some(response) => Ok(PipelineResponse {
                    status: response.status,
                    headers: response.headers,
                    body: response.body,
                    request_method: request.method,
                    request_url: request.url.clone(),
                }),
                None => Err(Error::Transport {
                    url: request.url.clone(),
                    reason: "mock transport has no scripted response left".to_string(),
                }),
            }
        }
    }
}
