//! Client-default `api-version` injection.

use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::{PipelineRequest, PipelineResponse};
use async_trait::async_trait;

/// Appends the client's default `api-version` query parameter when the
/// request URL does not already carry one.
///
/// Per-call and URL-embedded versions are resolved while the URL is
/// assembled, so by the time this policy runs an existing `api-version` in
/// the URL always outranks the client default.
pub struct ApiVersionPolicy {
    version: String,
}

impl ApiVersionPolicy {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

#[async_trait]
impl Policy for ApiVersionPolicy {
    fn name(&self) -> &str {
        "api_version"
    }

    async fn send(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, Error> {
        if !url_has_api_version(&request.url) {
            let separator = if request.url.contains('?') { '&' } else { '?' };
            let version = if request.skip_url_encoding {
                self.version.clone()
            } else {
                urlencoding::encode(&self.version).into_owned()
            };
            request.url = format!("{}{}api-version={}", request.url, separator, version);
        }
        next.run(request).await
    }
}

fn url_has_api_version(url: &str) -> bool {
    match url.split_once('?') {
        Some((_, query)) => query
            .split('&')
            .any(|pair| pair.split('=').next() == Some("api-version")),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_api_version_in_query_only() {
        assert!(url_has_api_version(
            "https://example.org/foo?api-version=2021-11-18"
        ));
        assert!(url_has_api_version(
            "https://example.org/foo?a=1&api-version=2"
        ));
        assert!(!url_has_api_version("https://example.org/foo"));
        assert!(!url_has_api_version(
            "https://example.org/api-version=lookalike"
        ));
        assert!(!url_has_api_version(
            "https://example.org/foo?versioning=api-version"
        ));
    }
}
