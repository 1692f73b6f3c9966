//! # Stratus Core
//!
//! Shared HTTP runtime for generated REST client crates: an ordered policy
//! pipeline, URL templating with `api-version` handling, continuation-token
//! paging, and resumable long-running-operation polling.
//!
//! ## Modules
//!
//! - [`client`] - Client facade and fluent request builder
//! - [`pipeline`] - Phased policy ordering and the middleware chain
//! - [`policy`] - The `Policy` trait and the built-in policies
//! - [`transport`] - The wire boundary, the default transport, and the
//!   mock transport for tests
//! - [`auth`] - Credential abstractions behind the auth policies
//! - [`operation`] - Declarative operation specs and the generic executor
//! - [`paging`] - Continuation-token paging
//! - [`lro`] - Long-running-operation polling and resume tokens
//! - [`headers`] - Case-insensitive header container
//! - [`request`] - Request/response types
//! - [`url_template`] - URL assembly and parameter encoding
//! - [`error`] - Error taxonomy

pub mod auth;
pub mod client;
pub mod error;
pub mod headers;
pub mod lro;
pub mod operation;
pub mod paging;
pub mod pipeline;
pub mod policy;
pub mod request;
pub mod transport;
pub mod url_template;

pub use client::{Client, ClientBuilder, RequestBuilder};
pub use error::Error;
pub use headers::HttpHeaders;
pub use lro::{OperationStatus, Poller, PollerOptions};
pub use operation::{OperationArguments, OperationSpec, send_operation_request};
pub use paging::{ListResult, Page, PageSettings, Pager};
pub use pipeline::{Pipeline, PipelineError, PipelinePhase, PolicyOptions, PolicyPosition};
pub use policy::{Next, Policy};
pub use request::{Method, PipelineRequest, PipelineResponse, RequestBody};
pub use transport::{HttpClient, ReqwestTransport, default_transport};
pub use url_template::{PathParam, QueryParam};
