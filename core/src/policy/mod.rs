//! Request/response interception.
//!
//! A [`Policy`] is a named unit of work composed into a
//! [`Pipeline`](crate::pipeline::Pipeline). Each policy receives the request
//! and the downstream continuation ([`Next`]) and decides whether, how, and
//! how many times to invoke it: pass through, rewrite the request, retry the
//! downstream chain, or short-circuit with its own response or error.

mod api_key;
mod api_version;
mod bearer_auth;
mod logging;
mod redirect;
mod request_id;
mod retry;
mod throttle;

pub use api_key::ApiKeyPolicy;
pub use api_version::ApiVersionPolicy;
pub use bearer_auth::BearerTokenPolicy;
pub use logging::LoggingPolicy;
pub use redirect::RedirectPolicy;
pub use request_id::{CLIENT_REQUEST_ID_HEADER, RequestIdPolicy};
pub use retry::{RetryOptions, RetryPolicy, parse_retry_after};
pub use throttle::ThrottlePolicy;

use crate::error::Error;
use crate::request::{PipelineRequest, PipelineResponse};
use crate::transport::HttpClient;
use async_trait::async_trait;
use std::sync::Arc;

/// A named request/response interceptor.
///
/// Names must be unique within a pipeline; they are the handle used by
/// `remove_policy` and by `before_policies` ordering constraints.
#[async_trait]
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    /// Handles the request, calling `next.run(request)` to proceed
    /// downstream. Not calling `next` short-circuits the pipeline.
    async fn send(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, Error>;
}

/// The downstream remainder of a pipeline: the policies that have not run
/// yet, terminating in the transport.
///
/// `Next` is `Copy` so retry-style policies can invoke the same downstream
/// chain once per attempt.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    policies: &'a [Arc<dyn Policy>],
    transport: &'a dyn HttpClient,
}

impl<'a> Next<'a> {
    pub(crate) fn new(policies: &'a [Arc<dyn Policy>], transport: &'a dyn HttpClient) -> Self {
        Self {
            policies,
            transport,
        }
    }

    /// Runs the remaining policies and finally the transport.
    pub async fn run(self, request: &mut PipelineRequest) -> Result<PipelineResponse, Error> {
        match self.policies.split_first() {
            Some((policy, rest)) => {
                let next = Next {
                    policies: rest,
                    transport: self.transport,
                };
                policy.send(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }
}
