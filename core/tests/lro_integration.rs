use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stratus_core::client::Client;
use stratus_core::error::Error;
use stratus_core::lro::{OperationStatus, Poller, PollerOptions};
use stratus_core::policy::RetryOptions;
use stratus_core::request::Method;
use stratus_core::transport::mock::{MockResponse, MockTransport};

// Helper module for long-running-operation tests
mod lro_helpers {
    use super::*;

    #[derive(Clone, Debug, Deserialize, PartialEq)]
    pub struct Widget {
        pub id: String,
        pub color: String,
    }

    pub fn client(transport: Arc<MockTransport>) -> Client {
        Client::builder("https://example.org")
            .retry(RetryOptions {
                max_retries: 0,
                ..RetryOptions::default()
            })
            .transport(transport)
            .build()
            .expect("client should build")
    }

    /// Pacing suitable for tests: no delay between polls.
    pub fn immediate() -> PollerOptions {
        PollerOptions {
            poll_interval: Duration::ZERO,
        }
    }
}

use lro_helpers::*;

mod happy_path {
    use super::*;

    #[tokio::test]
    async fn accepted_then_succeeded_resolves_after_one_poll() {
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(202).with_header("Location", "/status"),
            MockResponse::new(200).with_json(json!({
                "status": "Succeeded",
                "id": "w1",
                "color": "blue"
            })),
        ]));
        let client = client(transport.clone());

        let poller: Poller<Widget> = client
            .path("/widgets/{id}")
            .path_param("w1")
            .json(json!({"color": "blue"}))
            .begin(Method::Put)
            .await
            .unwrap();
        assert_eq!(poller.status(), OperationStatus::Running);

        let mut poller = poller.with_options(immediate());
        let widget = poller.poll_until_done().await.unwrap();
        assert_eq!(
            widget,
            Widget {
                id: "w1".into(),
                color: "blue".into()
            }
        );

        // Triggering call plus exactly one poll.
        assert_eq!(transport.request_count(), 2);
        let urls: Vec<String> = transport.requests().iter().map(|r| r.url.clone()).collect();
        assert_eq!(urls[1], "https://example.org/status");
    }

    #[tokio::test]
    async fn synchronous_completion_needs_no_poll() {
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(200).with_json(json!({"id": "w1", "color": "red"})),
        ]));
        let client = client(transport.clone());

        let mut poller: Poller<Widget> = client
            .path("/widgets/w1")
            .begin(Method::Put)
            .await
            .unwrap();
        assert_eq!(poller.status(), OperationStatus::Succeeded);

        let widget = poller.poll_until_done().await.unwrap();
        assert_eq!(widget.color, "red");
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn operation_location_outranks_location() {
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(202)
                .with_header("Operation-Location", "/operations/op-1")
                .with_header("Location", "/widgets/w1"),
            MockResponse::new(200).with_json(json!({"status": "Succeeded", "id": "w1", "color": "blue"})),
        ]));
        let client = client(transport.clone());

        let mut poller: Poller<Widget> = client
            .path("/widgets/w1")
            .begin(Method::Put)
            .await
            .unwrap();
        poller.poll().await.unwrap();

        assert_eq!(
            transport.requests()[1].url,
            "https://example.org/operations/op-1"
        );
    }

    #[tokio::test]
    async fn retry_after_hint_is_tracked() {
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(202)
                .with_header("Location", "/status")
                .with_header("Retry-After", "5"),
        ]));
        let client = client(transport);

        let poller: Poller<Widget> = client
            .path("/widgets/w1")
            .begin(Method::Delete)
            .await
            .unwrap();
        assert_eq!(poller.retry_after(), Some(Duration::from_secs(5)));
    }
}

mod resume {
    use super::*;

    #[tokio::test]
    async fn resume_token_reconstructs_an_equivalent_poller() {
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(202).with_header("Location", "/operations/op-9"),
            MockResponse::new(200).with_json(json!({"status": "InProgress"})),
        ]));
        let client = client(transport);

        let mut poller: Poller<Widget> = client
            .path("/widgets/w9")
            .begin(Method::Delete)
            .await
            .unwrap();
        poller.poll().await.unwrap();
        assert_eq!(poller.status(), OperationStatus::Running);
        let token = poller.resume_token().unwrap();

        // A new process: fresh transport, fresh client, same token.
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(200).with_json(json!({
                "status": "Succeeded",
                "id": "w9",
                "color": "green"
            })),
        ]));
        let client = client_from_new_process(transport.clone());
        let resumed: Poller<Widget> = Poller::from_resume_token(&client, &token).unwrap();
        assert_eq!(resumed.status(), OperationStatus::Running);

        let mut resumed = resumed.with_options(immediate());
        let widget = resumed.poll_until_done().await.unwrap();
        assert_eq!(widget.id, "w9");
        assert_eq!(
            transport.requests()[0].url,
            "https://example.org/operations/op-9"
        );
    }

    #[tokio::test]
    async fn tampered_token_is_a_configuration_error() {
        let client = client(Arc::new(MockTransport::new()));
        let err = Poller::<Widget>::from_resume_token(&client, "not a token").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    fn client_from_new_process(transport: Arc<MockTransport>) -> Client {
        lro_helpers::client(transport)
    }
}

mod failure {
    use super::*;

    #[tokio::test]
    async fn failed_status_is_state_not_a_poll_error() {
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(202).with_header("Location", "/status"),
            MockResponse::new(200).with_json(json!({
                "status": "Failed",
                "error": {"code": "ProvisioningFailed", "message": "quota exceeded"}
            })),
        ]));
        let client = client(transport);

        let mut poller: Poller<Widget> = client
            .path("/widgets/w1")
            .begin(Method::Put)
            .await
            .unwrap();

        // poll reflects the failure in state without throwing.
        let status = poller.poll().await.unwrap();
        assert_eq!(status, OperationStatus::Failed);

        let err = poller.poll_until_done().await.unwrap_err();
        match err {
            Error::OperationFailed {
                status,
                code,
                message,
            } => {
                assert_eq!(status, OperationStatus::Failed);
                assert_eq!(code.as_deref(), Some("ProvisioningFailed"));
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn canceled_status_surfaces_from_poll_until_done() {
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(202).with_header("Location", "/status"),
            MockResponse::new(200).with_json(json!({"status": "Canceled"})),
        ]));
        let client = client(transport);

        let poller: Poller<Widget> = client
            .path("/widgets/w1")
            .begin(Method::Delete)
            .await
            .unwrap();
        let err = poller
            .with_options(immediate())
            .poll_until_done()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OperationFailed {
                status: OperationStatus::Canceled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failing_status_check_is_a_poll_error() {
        let transport = Arc::new(MockTransport::with_responses([
            MockResponse::new(202).with_header("Location", "/status"),
            MockResponse::new(500).with_json(json!({
                "error": {"code": "InternalError", "message": "status endpoint down"}
            })),
        ]));
        let client = client(transport);

        let mut poller: Poller<Widget> = client
            .path("/widgets/w1")
            .begin(Method::Put)
            .await
            .unwrap();
        let err = poller.poll().await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        // The poller itself has not moved to a terminal state.
        assert_eq!(poller.status(), OperationStatus::Running);
    }
}
