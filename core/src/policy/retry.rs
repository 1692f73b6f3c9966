//! Retry with exponential backoff, jitter, and `Retry-After` pacing.

use crate::error::Error;
use crate::headers::HttpHeaders;
use crate::policy::{Next, Policy};
use crate::request::{PipelineRequest, PipelineResponse};
use async_trait::async_trait;
use rand::Rng;
use std::time::{Duration, Instant};

/// Configuration for [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct RetryOptions {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay for the first retry; doubles per attempt.
    pub initial_delay: Duration,
    /// Upper bound on a single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Retries transient failures: transport errors, timeouts, and responses
/// with status 408, 429, or 5xx. Everything else propagates immediately.
///
/// The delay between attempts honors the server's `Retry-After` hint when
/// present, otherwise exponential backoff with jitter. The policy observes
/// the caller's abort signal between attempts and stops retrying once the
/// remaining per-call time budget cannot accommodate the next delay.
pub struct RetryPolicy {
    options: RetryOptions,
}

impl RetryPolicy {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .options
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.options.max_delay);
        // 0.8x..1.2x jitter keeps concurrent callers from retrying in step.
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        exponential.mul_f64(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryOptions::default())
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

#[async_trait]
impl Policy for RetryPolicy {
    fn name(&self) -> &str {
        "retry"
    }

    async fn send(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, Error> {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            if request.is_aborted() {
                return Err(Error::Aborted);
            }

            let result = next.run(request).await;
            let retry_after = match &result {
                Ok(response) if is_retryable_status(response.status) => {
                    parse_retry_after(&response.headers)
                }
                Ok(_) => return result,
                Err(e) if e.is_transient() => None,
                Err(_) => return result,
            };

            if attempt >= self.options.max_retries {
                return result;
            }
            let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
            if let Some(timeout) = request.timeout {
                if started.elapsed() + delay >= timeout {
                    return result;
                }
            }

            attempt += 1;
            log::debug!(
                "attempt {} for {} {} failed, retrying in {:?}",
                attempt,
                request.method,
                request.url,
                delay
            );
            match &request.abort {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(Error::Aborted),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}

/// Parses the server's retry pacing hint from response headers.
///
/// Checks the millisecond variants (`retry-after-ms`, `x-ms-retry-after-ms`)
/// first, then standard `Retry-After` in both delta-seconds and HTTP-date
/// forms.
pub fn parse_retry_after(headers: &HttpHeaders) -> Option<Duration> {
    for name in ["retry-after-ms", "x-ms-retry-after-ms"] {
        if let Some(value) = headers.get(name) {
            if let Ok(ms) = value.trim().parse::<u64>() {
                return Some(Duration::from_millis(ms));
            }
        }
    }

    let value = headers.get("retry-after")?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.signed_duration_since(chrono::Utc::now());
    delta.to_std().ok()
}
