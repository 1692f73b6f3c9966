use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use stratus_core::client::Client;
use stratus_core::error::Error;
use stratus_core::pipeline::{PipelinePhase, PolicyOptions, PolicyPosition};
use stratus_core::policy::{Next, Policy, RetryOptions};
use stratus_core::request::{PipelineRequest, PipelineResponse};
use stratus_core::transport::mock::{MockResponse, MockTransport};

// Helper module for pipeline policy testing
mod pipeline_helpers {
    use super::*;

    /// A pass-through policy that counts its invocations.
    pub struct CountingPolicy {
        name: &'static str,
        count: Arc<AtomicUsize>,
    }

    impl CountingPolicy {
        pub fn new(name: &'static str) -> (Arc<dyn Policy>, Arc<AtomicUsize>) {
            let count = Arc::new(AtomicUsize::new(0));
            let policy = Arc::new(CountingPolicy {
                name,
                count: count.clone(),
            });
            (policy, count)
        }
    }

    #[async_trait]
    impl Policy for CountingPolicy {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(
            &self,
            request: &mut PipelineRequest,
            next: Next<'_>,
        ) -> Result<PipelineResponse, Error> {
            self.count.fetch_add(1, Ordering::SeqCst);
            next.run(request).await
        }
    }

    /// Retry options tuned so tests finish quickly.
    pub fn fast_retry() -> RetryOptions {
        RetryOptions {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    pub fn client_with_transport(transport: Arc<MockTransport>) -> Client {
        Client::builder("https://example.org")
            .retry(fast_retry())
            .transport(transport)
            .build()
            .expect("client should build")
    }
}

use pipeline_helpers::*;

mod invocation_counts {
    use super::*;

    #[tokio::test]
    async fn per_call_policy_runs_once_despite_retries() {
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(500),
            MockResponse::new(500),
            MockResponse::new(200),
        ]));
        let (per_call, per_call_count) = CountingPolicy::new("per_call_counter");
        let (per_retry, per_retry_count) = CountingPolicy::new("per_retry_counter");

        let client = client_with_transport(transport.clone());
        client
            .pipeline()
            .add_policy(
                per_call,
                PolicyOptions::default().with_position(PolicyPosition::PerCall),
            )
            .unwrap();
        client
            .pipeline()
            .add_policy(
                per_retry,
                PolicyOptions::default().with_position(PolicyPosition::PerRetry),
            )
            .unwrap();

        let response = client.path("/foo").get().await.unwrap();
        assert_eq!(response.status, 200);

        assert_eq!(per_call_count.load(Ordering::SeqCst), 1);
        assert_eq!(per_retry_count.load(Ordering::SeqCst), 3);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn per_retry_count_matches_attempts_when_retries_exhaust() {
        // Four attempts total: the initial one plus max_retries.
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(503),
            MockResponse::new(503),
            MockResponse::new(503),
            MockResponse::new(503),
        ]));
        let (per_retry, per_retry_count) = CountingPolicy::new("per_retry_counter");

        let client = client_with_transport(transport.clone());
        client
            .pipeline()
            .add_policy(
                per_retry,
                PolicyOptions::default().with_position(PolicyPosition::PerRetry),
            )
            .unwrap();

        let response = client.path("/foo").get().await.unwrap();
        // Retries exhausted: the last response is returned as-is.
        assert_eq!(response.status, 503);
        assert_eq!(per_retry_count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_status_is_not_retried() {
        let transport = Arc::new(MockTransport::with_responses([MockResponse::new(404)]));
        let client = client_with_transport(transport.clone());

        let response = client.path("/foo").get().await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(transport.request_count(), 1);
    }
}

mod ordering {
    use super::*;

    #[tokio::test]
    async fn per_call_runs_before_retry_phase_and_per_retry_after() {
        let (per_retry, _) = CountingPolicy::new("policy1");
        let (per_call, _) = CountingPolicy::new("policy2");

        let client = Client::builder("https://example.org?api-version=1233321")
            .transport(Arc::new(MockTransport::new()))
            .policy(
                per_retry,
                PolicyOptions::default().with_position(PolicyPosition::PerRetry),
            )
            .policy(
                per_call,
                PolicyOptions::default().with_position(PolicyPosition::PerCall),
            )
            .build()
            .unwrap();

        let names: Vec<String> = client
            .pipeline()
            .get_ordered_policies()
            .iter()
            .map(|p| p.name().to_string())
            .collect();

        let position = |name: &str| {
            names
                .iter()
                .position(|n| n == name)
                .unwrap_or_else(|| panic!("policy {name} missing from {names:?}"))
        };
        assert!(position("policy2") < position("retry"));
        assert!(position("retry") < position("policy1"));
    }

    #[tokio::test]
    async fn duplicate_policy_name_is_rejected() {
        let client = client_with_transport(Arc::new(MockTransport::new()));
        let (first, _) = CountingPolicy::new("observer");
        let (second, _) = CountingPolicy::new("observer");

        client
            .pipeline()
            .add_policy(first, PolicyOptions::default())
            .unwrap();
        let err = client
            .pipeline()
            .add_policy(second, PolicyOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("observer"));
    }

    #[tokio::test]
    async fn validation_policy_after_serialize_sees_final_url() {
        struct AssertUrlPolicy;

        #[async_trait]
        impl Policy for AssertUrlPolicy {
            fn name(&self) -> &str {
                "validation"
            }

            async fn send(
                &self,
                request: &mut PipelineRequest,
                next: Next<'_>,
            ) -> Result<PipelineResponse, Error> {
                assert!(request.url.contains("api-version=2021-11-18"));
                next.run(request).await
            }
        }

        let transport = Arc::new(MockTransport::with_responses([MockResponse::new(200)]));
        let client = Client::builder("https://example.org")
            .api_version("2021-11-18")
            .transport(transport)
            .build()
            .unwrap();
        client
            .pipeline()
            .add_policy(
                Arc::new(AssertUrlPolicy),
                PolicyOptions::default().with_after_phase(PipelinePhase::Serialize),
            )
            .unwrap();

        client.path("/foo").get().await.unwrap();
    }
}

mod short_circuit {
    use super::*;
    use stratus_core::headers::HttpHeaders;
    use stratus_core::request::Method;

    /// A policy that answers from cache without calling downstream.
    struct CannedResponsePolicy;

    #[async_trait]
    impl Policy for CannedResponsePolicy {
        fn name(&self) -> &str {
            "canned"
        }

        async fn send(
            &self,
            request: &mut PipelineRequest,
            _next: Next<'_>,
        ) -> Result<PipelineResponse, Error> {
            Ok(PipelineResponse {
                status: 200,
                headers: HttpHeaders::new(),
                body: b"cached".to_vec(),
                request_method: Method::Get,
                request_url: request.url.clone(),
            })
        }
    }

    #[tokio::test]
    async fn policy_can_short_circuit_without_reaching_transport() {
        let transport = Arc::new(MockTransport::new());
        let client = client_with_transport(transport.clone());
        client
            .pipeline()
            .add_policy(Arc::new(CannedResponsePolicy), PolicyOptions::default())
            .unwrap();

        let response = client.path("/foo").get().await.unwrap();
        assert_eq!(response.text(), "cached");
        assert_eq!(transport.request_count(), 0);
    }
}
