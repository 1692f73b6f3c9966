//! Client request ID stamping.

use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::{PipelineRequest, PipelineResponse};
use async_trait::async_trait;

/// Header carrying the caller-generated correlation ID.
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Stamps `x-ms-client-request-id` with a fresh UUID when the caller has
/// not supplied one.
#[derive(Default)]
pub struct RequestIdPolicy;

impl RequestIdPolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Policy for RequestIdPolicy {
    fn name(&self) -> &str {
        "request_id"
    }

    async fn send(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, Error> {
        if !request.headers.contains(CLIENT_REQUEST_ID_HEADER) {
            request
                .headers
                .set(CLIENT_REQUEST_ID_HEADER, uuid::Uuid::new_v4().to_string());
        }
        next.run(request).await
    }
}
