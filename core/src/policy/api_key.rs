//! Shared-key header authentication.

use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::{PipelineRequest, PipelineResponse};
use async_trait::async_trait;

/// Sets a fixed credential header on every attempt, e.g.
/// `Ocp-Apim-Subscription-Key` for subscription-key services.
pub struct ApiKeyPolicy {
    header_name: String,
    key: String,
}

impl ApiKeyPolicy {
    pub fn new(header_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl Policy for ApiKeyPolicy {
    fn name(&self) -> &str {
        "api_key"
    }

    async fn send(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, Error> {
        request
            .headers
            .set(self.header_name.clone(), self.key.clone());
        next.run(request).await
    }
}
