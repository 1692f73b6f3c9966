//! Long-running operations.
//!
//! A service that cannot finish a mutation synchronously answers the
//! triggering call with a pending status and a URL to poll. [`Poller`]
//! wraps that initial response, tracks the operation's state machine
//! (`NotStarted → Running → Succeeded | Failed | Canceled`, terminal states
//! absorbing), and can snapshot itself into an opaque resume token so a new
//! process can pick up polling without re-issuing the mutation.
//!
//! The poller owns no timers: a single [`poll`](Poller::poll) never sleeps,
//! and [`poll_until_done`](Poller::poll_until_done) waits between polls
//! using the server's `Retry-After` hint or a fixed interval. Abandoning a
//! poller leaks nothing.

use crate::client::Client;
use crate::error::Error;
use crate::operation::{error_from_response, parse_error_envelope};
use crate::policy::parse_retry_after;
use crate::request::{Method, PipelineRequest, PipelineResponse};
use crate::url_template::resolve_reference;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lifecycle states of a long-running operation. Transitions only move
/// forward; terminal states are absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Succeeded | OperationStatus::Failed | OperationStatus::Canceled
        )
    }
}

/// Pacing configuration for [`Poller::poll_until_done`].
#[derive(Clone, Debug)]
pub struct PollerOptions {
    /// Delay between polls when the service sends no `Retry-After`.
    pub poll_interval: Duration,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Serializable snapshot sufficient to reconstruct a poller.
#[derive(Serialize, Deserialize)]
struct ResumeState {
    status_url: String,
    status: OperationStatus,
    retry_after_secs: Option<u64>,
}

/// Tracks one long-running operation to completion.
///
/// `T` is the final resource type deserialized from the terminal
/// `Succeeded` body.
pub struct Poller<T> {
    client: Client,
    status_url: String,
    status: OperationStatus,
    retry_after: Option<Duration>,
    result: Option<Value>,
    failure: Option<(Option<String>, Option<String>)>,
    options: PollerOptions,
    abort: Option<CancellationToken>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Poller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("status_url", &self.status_url)
            .field("status", &self.status)
            .field("retry_after", &self.retry_after)
            .finish_non_exhaustive()
    }
}

impl<T: serde::de::DeserializeOwned> Poller<T> {
    /// Creates a poller from the response of the triggering PUT/POST/DELETE.
    ///
    /// The operation-status URL is taken from the first of
    /// `Operation-Location`, `Azure-AsyncOperation`, and `Location`, falling
    /// back to the originating request URL for resource-convention
    /// operations. A triggering response that already carries a terminal
    /// body completes the poller immediately.
    pub fn from_initial_response(client: &Client, response: PipelineResponse) -> Result<Self, Error> {
        if !response.is_success() {
            return Err(error_from_response(&response));
        }

        let header_url = ["operation-location", "azure-asyncoperation", "location"]
            .iter()
            .find_map(|name| response.headers.get(name));
        let retry_after = parse_retry_after(&response.headers);
        let body: Option<Value> = if response.body.is_empty() {
            None
        } else {
            serde_json::from_slice(&response.body).ok()
        };
        let body_status = body.as_ref().and_then(status_from_body);

        let mut poller = Self {
            client: client.clone(),
            status_url: String::new(),
            status: OperationStatus::Running,
            retry_after,
            result: None,
            failure: None,
            options: PollerOptions::default(),
            abort: None,
            _marker: PhantomData,
        };

        match header_url {
            Some(reference) => {
                poller.status_url = resolve_reference(&response.request_url, reference);
                poller.status = body_status.unwrap_or(OperationStatus::Running);
            }
            None => {
                poller.status_url = response.request_url.clone();
                poller.status = match body_status {
                    Some(status) => status,
                    // No status convention in play: the call completed
                    // synchronously unless it answered 202.
                    None if response.status == 202 => OperationStatus::Running,
                    None => OperationStatus::Succeeded,
                };
            }
        }
        if poller.status == OperationStatus::Succeeded {
            poller.result = body;
        } else if poller.status.is_terminal() {
            poller.failure = Some(parse_error_envelope(&response.body));
        }
        Ok(poller)
    }

    /// Reconstructs a poller from a token produced by
    /// [`resume_token`](Poller::resume_token), typically in a new process.
    pub fn from_resume_token(client: &Client, token: &str) -> Result<Self, Error> {
        let bytes = BASE64
            .decode(token)
            .map_err(|_| Error::Configuration("invalid resume token".to_string()))?;
        let state: ResumeState = serde_json::from_slice(&bytes)
            .map_err(|_| Error::Configuration("invalid resume token".to_string()))?;
        Ok(Self {
            client: client.clone(),
            status_url: state.status_url,
            status: state.status,
            retry_after: state.retry_after_secs.map(Duration::from_secs),
            result: None,
            failure: None,
            options: PollerOptions::default(),
            abort: None,
            _marker: PhantomData,
        })
    }

    pub fn with_options(mut self, options: PollerOptions) -> Self {
        self.options = options;
        self
    }

    /// Observe this abort signal while waiting between polls.
    pub fn with_abort(mut self, token: CancellationToken) -> Self {
        self.abort = Some(token);
        self
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    /// The server's current pacing hint, when one was provided.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// URL polled for operation status.
    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    /// An opaque snapshot of this poller, serializable by the caller.
    pub fn resume_token(&self) -> Result<String, Error> {
        let state = ResumeState {
            status_url: self.status_url.clone(),
            status: self.status,
            retry_after_secs: self.retry_after.map(|d| d.as_secs()),
        };
        let bytes = serde_json::to_vec(&state).map_err(|e| Error::Deserialization {
            reason: format!("failed to serialize resume token: {e}"),
        })?;
        Ok(BASE64.encode(bytes))
    }

    /// Issues one GET to the status URL and updates the tracked state.
    ///
    /// Never sleeps. Fails only when the status check itself fails at the
    /// transport or HTTP layer; a service-reported `Failed`/`Canceled` is
    /// reflected in [`status`](Poller::status), not thrown here.
    pub async fn poll(&mut self) -> Result<OperationStatus, Error> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }

        let mut request = PipelineRequest::new(Method::Get, self.status_url.clone());
        request.skip_url_encoding = true;
        request.abort = self.abort.clone();
        request.allow_insecure_connection = self.client.allow_insecure_connection();

        let response = self.client.send_request(&mut request).await?;
        if !response.is_success() {
            return Err(error_from_response(&response));
        }

        self.retry_after = parse_retry_after(&response.headers);
        let body: Option<Value> = if response.body.is_empty() {
            None
        } else {
            Some(response.json()?)
        };
        let status = match body.as_ref().and_then(status_from_body) {
            Some(status) => status,
            None if response.status == 202 => OperationStatus::Running,
            None => OperationStatus::Succeeded,
        };

        self.status = status;
        match status {
            OperationStatus::Succeeded => {
                self.result = body.or(self.result.take());
            }
            OperationStatus::Failed | OperationStatus::Canceled => {
                self.failure = Some(parse_error_envelope(&response.body));
            }
            _ => {}
        }
        Ok(self.status)
    }

    /// Polls to a terminal state, pacing with `Retry-After` or the
    /// configured interval, then returns the final resource for
    /// `Succeeded` or a structured error for `Failed`/`Canceled`.
    ///
    /// A concurrently issued cancel request does not interrupt this loop;
    /// it takes effect when a poll observes the canceled status.
    pub async fn poll_until_done(&mut self) -> Result<T, Error> {
        while !self.status.is_terminal() {
            let delay = self.retry_after.unwrap_or(self.options.poll_interval);
            if !delay.is_zero() {
                match &self.abort {
                    Some(token) => {
                        tokio::select! {
                            _ = token.cancelled() => return Err(Error::Aborted),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => tokio::time::sleep(delay).await,
                }
            }
            self.poll().await?;
        }

        match self.status {
            OperationStatus::Succeeded => {
                let value = self.result.clone().unwrap_or(Value::Null);
                serde_json::from_value(value).map_err(|e| Error::Deserialization {
                    reason: format!("failed to decode final resource: {e}"),
                })
            }
            status => {
                let (code, message) = self.failure.clone().unwrap_or((None, None));
                Err(Error::OperationFailed {
                    status,
                    code,
                    message: message.unwrap_or_else(|| format!("operation ended as {status:?}")),
                })
            }
        }
    }
}

/// Reads the operation status from a poll body, accepting the `status`
/// field and the ARM `provisioningState` conventions. Unrecognized states
/// count as still running.
fn status_from_body(body: &Value) -> Option<OperationStatus> {
    let state = body
        .get("status")
        .and_then(Value::as_str)
        .or_else(|| {
            body.pointer("/properties/provisioningState")
                .and_then(Value::as_str)
        })
        .or_else(|| body.get("provisioningState").and_then(Value::as_str))?;

    Some(match state.to_ascii_lowercase().as_str() {
        "notstarted" => OperationStatus::NotStarted,
        "succeeded" | "success" | "completed" => OperationStatus::Succeeded,
        "failed" => OperationStatus::Failed,
        "canceled" | "cancelled" => OperationStatus::Canceled,
        _ => OperationStatus::Running,
    })
}
