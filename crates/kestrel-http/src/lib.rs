//! Resilient client for a remote JSON API.
//!
//! Calls go through an [`ApiClient`], which retries transient failures with
//! exponential backoff, bounds every attempt with a deadline, honors caller
//! cancellation, and normalizes every failure into a small set of
//! [`ErrorKind`]s. Streaming calls resolve to an [`EventStream`] that decodes
//! `data: <json>` frames as the body arrives.

pub mod cancel;
pub mod client;
pub mod decoder;
pub mod error;
pub mod executor;
pub mod policy;
pub mod request;
pub mod routes;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use reqwest::{Method, StatusCode};

pub use cancel::{CancellationToken, CancellationWatcher};
pub use client::{ApiCall, ApiClient, ApiOutput, StatusMap, DEFAULT_STREAM_TIMEOUT};
pub use decoder::{decode_frame, EventStream, FrameBuffer, FRAME_MARKER};
pub use error::{ApiResult, ErrorKind, HttpError, NormalizedError};
pub use executor::Executor;
pub use policy::RetryPolicy;
pub use request::{headers, RequestBody, RequestBuilder, RequestDescriptor};
pub use routes::{Operation, Service, Verb};
pub use transport::{
    build_client, ByteSource, HttpConfig, ReqwestBody, ReqwestTransport, Response, Transport,
    TransportError,
};
