//! Request/response logging through the `log` facade.

use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::{PipelineRequest, PipelineResponse};
use async_trait::async_trait;
use std::time::Instant;

/// Logs each attempt's method, URL, status, and duration.
///
/// Runs per attempt (inside the retry loop) so retried requests are visible
/// individually. Header values never appear in log output; the
/// [`HttpHeaders`](crate::headers::HttpHeaders) `Debug` impl redacts
/// credentials if a caller logs them explicitly.
#[derive(Default)]
pub struct LoggingPolicy;

impl LoggingPolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Policy for LoggingPolicy {
    fn name(&self) -> &str {
        "logging"
    }

    async fn send(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, Error> {
        log::debug!("sending {} {}", request.method, request.url);
        let started = Instant::now();
        let result = next.run(request).await;
        match &result {
            Ok(response) => {
                log::debug!(
                    "{} {} returned {} in {:?}",
                    request.method,
                    request.url,
                    response.status,
                    started.elapsed()
                );
            }
            Err(e) => {
                log::warn!(
                    "{} {} failed after {:?}: {e}",
                    request.method,
                    request.url,
                    started.elapsed()
                );
            }
        }
        result
    }
}
