//! Client-side request throttling.

use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::{PipelineRequest, PipelineResponse};
use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;

/// Caps the rate of attempts reaching the transport.
///
/// Opt-in; useful against management endpoints with aggressive server-side
/// throttling, where waiting locally is cheaper than burning 429 retries.
/// Attempts wait for capacity rather than failing.
pub struct ThrottlePolicy {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
}

impl ThrottlePolicy {
    /// Creates a policy allowing `requests_per_second` attempts per second,
    /// with bursts up to the same size.
    pub fn new(requests_per_second: u32) -> Result<Self, Error> {
        let quota = NonZeroU32::new(requests_per_second)
            .map(Quota::per_second)
            .ok_or_else(|| {
                Error::Configuration("requests_per_second must be greater than zero".to_string())
            })?;
        Ok(Self {
            limiter: RateLimiter::direct(quota),
        })
    }
}

#[async_trait]
impl Policy for ThrottlePolicy {
    fn name(&self) -> &str {
        "throttle"
    }

    async fn send(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, Error> {
        self.limiter.until_ready().await;
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_is_a_configuration_error() {
        assert!(matches!(
            ThrottlePolicy::new(0),
            Err(Error::Configuration(_))
        ));
        assert!(ThrottlePolicy::new(1).is_ok());
    }
}
