//! Client facade: endpoint + pipeline + transport, with a fluent request
//! builder.

use crate::auth::TokenCredential;
use crate::error::Error;
use crate::headers::HttpHeaders;
use crate::lro::Poller;
use crate::operation::error_from_response;
use crate::paging::{ListResult, Page, Pager};
use crate::pipeline::{Pipeline, PipelinePhase, PolicyOptions, PolicyPosition};
use crate::policy::{
    ApiKeyPolicy, ApiVersionPolicy, BearerTokenPolicy, LoggingPolicy, Policy, RedirectPolicy,
    RequestIdPolicy, RetryOptions, RetryPolicy, ThrottlePolicy,
};
use crate::request::{Method, PipelineRequest, PipelineResponse, RequestBody};
use crate::transport::{HttpClient, default_transport};
use crate::url_template::{PathParam, QueryParam, build_url};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct ClientInner {
    endpoint: String,
    api_version: Option<String>,
    allow_insecure_connection: bool,
    pipeline: Pipeline,
    transport: Arc<dyn HttpClient>,
}

/// A REST client bound to a base endpoint, a policy pipeline, and a
/// transport. Cheap to clone; clones share the pipeline and transport.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder(endpoint: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(endpoint)
    }

    /// A client with the default pipeline and transport.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, Error> {
        Self::builder(endpoint).build()
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub(crate) fn api_version(&self) -> Option<&str> {
        self.inner.api_version.as_deref()
    }

    pub(crate) fn allow_insecure_connection(&self) -> bool {
        self.inner.allow_insecure_connection
    }

    /// The client's pipeline. Policies may be added or removed between
    /// calls; mutating while requests are in flight is the caller's
    /// responsibility.
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Starts a request against a path template relative to the endpoint.
    pub fn path(&self, template: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            template: template.into(),
            path_params: Vec::new(),
            query_params: Vec::new(),
            headers: HttpHeaders::new(),
            body: None,
            timeout: None,
            abort: None,
            allow_insecure_connection: None,
            skip_url_encoding: false,
        }
    }

    /// Dispatches a fully assembled request through the pipeline.
    pub async fn send_request(
        &self,
        request: &mut PipelineRequest,
    ) -> Result<PipelineResponse, Error> {
        self.inner
            .pipeline
            .send_request(self.inner.transport.as_ref(), request)
            .await
    }
}

/// Configures and builds a [`Client`].
pub struct ClientBuilder {
    endpoint: String,
    api_version: Option<String>,
    allow_insecure_connection: bool,
    retry: RetryOptions,
    requests_per_second: Option<u32>,
    credential: Option<(Arc<dyn TokenCredential>, Vec<String>)>,
    api_key: Option<(String, String)>,
    transport: Option<Arc<dyn HttpClient>>,
    additional_policies: Vec<(Arc<dyn Policy>, PolicyOptions)>,
    pipeline: Option<Pipeline>,
}

impl ClientBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: None,
            allow_insecure_connection: false,
            retry: RetryOptions::default(),
            requests_per_second: None,
            credential: None,
            api_key: None,
            transport: None,
            additional_policies: Vec::new(),
            pipeline: None,
        }
    }

    /// Default `api-version` for all operations. A version embedded in the
    /// request URL or supplied as a per-call query parameter wins over it.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Client-wide default for accepting invalid TLS certificates;
    /// overridable per request.
    pub fn allow_insecure_connection(mut self, allow: bool) -> Self {
        self.allow_insecure_connection = allow;
        self
    }

    pub fn retry(mut self, options: RetryOptions) -> Self {
        self.retry = options;
        self
    }

    /// Enables client-side throttling of attempts reaching the transport.
    pub fn requests_per_second(mut self, rate: u32) -> Self {
        self.requests_per_second = Some(rate);
        self
    }

    /// Authenticate with bearer tokens from the credential for the given
    /// scopes.
    pub fn bearer_auth(mut self, credential: Arc<dyn TokenCredential>, scopes: Vec<String>) -> Self {
        self.credential = Some((credential, scopes));
        self
    }

    /// Authenticate with a fixed key header, e.g.
    /// `Ocp-Apim-Subscription-Key`.
    pub fn api_key(mut self, header_name: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_key = Some((header_name.into(), key.into()));
        self
    }

    /// Overrides the transport. Defaults to the shared process-wide
    /// [`ReqwestTransport`](crate::transport::ReqwestTransport).
    pub fn transport(mut self, transport: Arc<dyn HttpClient>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Adds a policy on top of the default pipeline.
    pub fn policy(mut self, policy: Arc<dyn Policy>, options: PolicyOptions) -> Self {
        self.additional_policies.push((policy, options));
        self
    }

    /// Replaces the default pipeline entirely. Conventional policies (auth,
    /// retry, redirect, api-version, request-id, logging) are not added.
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn build(self) -> Result<Client, Error> {
        let pipeline = match self.pipeline {
            Some(pipeline) => pipeline,
            None => {
                let pipeline = Pipeline::new();
                pipeline.add_policy(Arc::new(RequestIdPolicy::new()), PolicyOptions::default())?;
                if let Some(version) = &self.api_version {
                    pipeline.add_policy(
                        Arc::new(ApiVersionPolicy::new(version.clone())),
                        PolicyOptions::default().with_phase(PipelinePhase::Serialize),
                    )?;
                }
                pipeline.add_policy(Arc::new(RedirectPolicy::default()), PolicyOptions::default())?;
                pipeline.add_policy(
                    Arc::new(RetryPolicy::new(self.retry.clone())),
                    PolicyOptions::default().with_phase(PipelinePhase::Retry),
                )?;
                if let Some(rate) = self.requests_per_second {
                    pipeline.add_policy(
                        Arc::new(ThrottlePolicy::new(rate)?),
                        PolicyOptions::default().with_position(PolicyPosition::PerRetry),
                    )?;
                }
                pipeline.add_policy(
                    Arc::new(LoggingPolicy::new()),
                    PolicyOptions::default().with_position(PolicyPosition::PerRetry),
                )?;
                if let Some((credential, scopes)) = self.credential {
                    pipeline.add_policy(
                        Arc::new(BearerTokenPolicy::new(credential, scopes)),
                        PolicyOptions::default().with_position(PolicyPosition::PerRetry),
                    )?;
                }
                if let Some((header_name, key)) = self.api_key {
                    pipeline.add_policy(
                        Arc::new(ApiKeyPolicy::new(header_name, key)),
                        PolicyOptions::default().with_position(PolicyPosition::PerRetry),
                    )?;
                }
                pipeline
            }
        };
        for (policy, options) in self.additional_policies {
            pipeline.add_policy(policy, options)?;
        }

        Ok(Client {
            inner: Arc::new(ClientInner {
                endpoint: self.endpoint,
                api_version: self.api_version,
                allow_insecure_connection: self.allow_insecure_connection,
                pipeline,
                transport: self.transport.unwrap_or_else(default_transport),
            }),
        })
    }
}

/// Fluent builder for one request: path/query parameters, headers, body,
/// and per-call overrides, finished by a verb method.
pub struct RequestBuilder {
    client: Client,
    template: String,
    path_params: Vec<PathParam>,
    query_params: Vec<(String, QueryParam)>,
    headers: HttpHeaders,
    body: Option<RequestBody>,
    timeout: Option<Duration>,
    abort: Option<CancellationToken>,
    allow_insecure_connection: Option<bool>,
    skip_url_encoding: bool,
}

impl RequestBuilder {
    /// Supplies the next positional `{placeholder}` value.
    pub fn path_param(mut self, param: impl Into<PathParam>) -> Self {
        self.path_params.push(param.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, param: impl Into<QueryParam>) -> Self {
        self.query_params.push((name.into(), param.into()));
        self
    }

    /// Per-call `api-version`, overriding the client default.
    pub fn api_version(self, version: impl Into<String>) -> Self {
        self.query("api-version", QueryParam::new(version))
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json(self, value: serde_json::Value) -> Self {
        self.body(RequestBody::Json(value))
    }

    pub fn text(self, value: impl Into<String>) -> Self {
        self.body(RequestBody::Text(value.into()))
    }

    pub fn binary(self, value: impl Into<Vec<u8>>) -> Self {
        self.body(RequestBody::Binary(value.into()))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn abort(mut self, token: CancellationToken) -> Self {
        self.abort = Some(token);
        self
    }

    /// Per-request TLS override; unset falls back to the client default.
    pub fn allow_insecure_connection(mut self, allow: bool) -> Self {
        self.allow_insecure_connection = Some(allow);
        self
    }

    /// The caller asserts query values are already encoded; the builder
    /// will not percent-encode them.
    pub fn skip_url_encoding(mut self, skip: bool) -> Self {
        self.skip_url_encoding = skip;
        self
    }

    pub async fn get(self) -> Result<PipelineResponse, Error> {
        self.send(Method::Get).await
    }

    pub async fn post(self) -> Result<PipelineResponse, Error> {
        self.send(Method::Post).await
    }

    pub async fn put(self) -> Result<PipelineResponse, Error> {
        self.send(Method::Put).await
    }

    pub async fn patch(self) -> Result<PipelineResponse, Error> {
        self.send(Method::Patch).await
    }

    pub async fn delete(self) -> Result<PipelineResponse, Error> {
        self.send(Method::Delete).await
    }

    pub async fn head(self) -> Result<PipelineResponse, Error> {
        self.send(Method::Head).await
    }

    /// Builds the URL and dispatches the request through the pipeline.
    pub async fn send(self, method: Method) -> Result<PipelineResponse, Error> {
        let (client, mut request) = self.into_request(method)?;
        client.send_request(&mut request).await
    }

    /// Existence check: 404 is a valid negative result, any other
    /// non-success status is a hard error.
    pub async fn exists(self) -> Result<bool, Error> {
        let response = self.send(Method::Head).await?;
        if response.status == 404 {
            return Ok(false);
        }
        if response.is_success() {
            return Ok(true);
        }
        Err(error_from_response(&response))
    }

    /// Issues the triggering call for a long-running operation and wraps
    /// the response in a [`Poller`].
    pub async fn begin<T: serde::de::DeserializeOwned>(
        self,
        method: Method,
    ) -> Result<Poller<T>, Error> {
        let client = self.client.clone();
        let (_, mut request) = self.into_request(method)?;
        let response = client.send_request(&mut request).await?;
        Poller::from_initial_response(&client, response)
    }

    /// Turns this list request into a [`Pager`] following `nextLink`
    /// continuation tokens. The operation has no page-size knob.
    pub fn paged<T>(self) -> Result<Pager<T>, Error>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        self.paged_inner(None)
    }

    /// Like [`paged`](RequestBuilder::paged), for operations honoring a
    /// page-size cap passed as the named query parameter (e.g. `$top`).
    pub fn paged_with_page_size_param<T>(self, param_name: &str) -> Result<Pager<T>, Error>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        self.paged_inner(Some(param_name.to_string()))
    }

    fn paged_inner<T>(self, page_size_param: Option<String>) -> Result<Pager<T>, Error>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let first_url = self.build_url()?;
        let client = self.client.clone();
        let headers = self.headers.clone();
        let allow_insecure = self
            .allow_insecure_connection
            .unwrap_or(client.allow_insecure_connection());
        let supports_page_size = page_size_param.is_some();

        let fetch = move |token: Option<String>, max_page_size: Option<u32>| {
            let client = client.clone();
            let headers = headers.clone();
            let first_url = first_url.clone();
            let page_size_param = page_size_param.clone();
            async move {
                let url = match token {
                    // Continuation links arrive fully formed and encoded.
                    Some(link) => link,
                    None => match (&page_size_param, max_page_size) {
                        (Some(param), Some(size)) => append_raw_query(&first_url, param, size),
                        _ => first_url,
                    },
                };
                let mut request = PipelineRequest::new(Method::Get, url);
                request.headers = headers;
                request.skip_url_encoding = true;
                request.allow_insecure_connection = allow_insecure;

                let response = client.send_request(&mut request).await?.error_for_status()?;
                let list: ListResult<T> = response.json()?;
                Ok(Page {
                    items: list.value,
                    continuation_token: list.next_link,
                })
            }
        };

        Ok(if supports_page_size {
            Pager::with_page_size_support(fetch)
        } else {
            Pager::new(fetch)
        })
    }

    fn build_url(&self) -> Result<String, Error> {
        build_url(
            self.client.endpoint(),
            &self.template,
            &self.path_params,
            &self.query_params,
            self.client.api_version(),
            self.skip_url_encoding,
        )
    }

    fn into_request(self, method: Method) -> Result<(Client, PipelineRequest), Error> {
        let url = self.build_url()?;
        let mut request = PipelineRequest::new(method, url);
        request.headers = self.headers;
        request.body = self.body;
        request.timeout = self.timeout;
        request.abort = self.abort;
        request.allow_insecure_connection = self
            .allow_insecure_connection
            .unwrap_or(self.client.allow_insecure_connection());
        request.skip_url_encoding = self.skip_url_encoding;
        Ok((self.client, request))
    }
}

fn append_raw_query(url: &str, name: &str, value: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{name}={value}")
}
