//! Bearer token authentication.

use crate::auth::TokenCredential;
use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::{PipelineRequest, PipelineResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// Attaches `Authorization: Bearer <token>` to every attempt, fetching the
/// token from the credential each time so expired tokens refresh naturally
/// across retries.
///
/// A 401 triggers one token refetch and replay of the attempt; a second 401
/// is returned to the caller.
pub struct BearerTokenPolicy {
    credential: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
}

impl BearerTokenPolicy {
    pub fn new(credential: Arc<dyn TokenCredential>, scopes: Vec<String>) -> Self {
        Self { credential, scopes }
    }

    async fn apply_token(&self, request: &mut PipelineRequest) -> Result<(), Error> {
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let token = self.credential.get_token(&scopes).await?;
        request
            .headers
            .set("Authorization", format!("Bearer {}", token.token));
        Ok(())
    }
}

#[async_trait]
impl Policy for BearerTokenPolicy {
    fn name(&self) -> &str {
        "bearer_auth"
    }

    async fn send(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, Error> {
        self.apply_token(request).await?;
        let response = next.run(request).await?;
        if response.status != 401 {
            return Ok(response);
        }

        log::debug!(
            "received 401 from {}, refreshing token and replaying once",
            request.url
        );
        self.apply_token(request).await?;
        next.run(request).await
    }
}
