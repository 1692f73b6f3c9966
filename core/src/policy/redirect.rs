//! Bounded redirect following.

use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::{Method, PipelineRequest, PipelineResponse};
use crate::url_template::resolve_reference;
use async_trait::async_trait;

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Follows `Location` redirects up to a bounded hop count.
///
/// A 303 re-issues as GET with the body dropped; relative `Location` values
/// resolve against the origin of the redirecting URL. When the hop limit is
/// reached the last redirect response is returned as-is.
pub struct RedirectPolicy {
    max_redirects: usize,
}

impl RedirectPolicy {
    pub fn new(max_redirects: usize) -> Self {
        Self { max_redirects }
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::new(20)
    }
}

#[async_trait]
impl Policy for RedirectPolicy {
    fn name(&self) -> &str {
        "redirect"
    }

    async fn send(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, Error> {
        let mut hops = 0usize;
        loop {
            let response = next.run(request).await?;
            if !REDIRECT_STATUSES.contains(&response.status) || hops >= self.max_redirects {
                return Ok(response);
            }
            let Some(location) = response.headers.get("location") else {
                return Ok(response);
            };

            let target = resolve_reference(&request.url, location);
            log::debug!(
                "following {} redirect from {} to {}",
                response.status,
                request.url,
                target
            );
            request.url = target;
            if response.status == 303 {
                request.method = Method::Get;
                request.body = None;
            }
            hops += 1;
        }
    }
}
