//! The transport boundary: send a request, get back a status and a body.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, StatusCode};

use crate::error::HttpError;
use crate::request::RequestDescriptor;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Sends a single request.
///
/// Dropping the returned future must abort the request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<Response, TransportError>;
}

/// A response body read chunk by chunk.
#[async_trait]
pub trait ByteSource: Send {
    /// Pull the next chunk; `Ok(None)` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Release the underlying connection. Later pulls return `Ok(None)`.
    fn release(&mut self);
}

/// A response handle: status, headers and an unread body.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Box<dyn ByteSource>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Box<dyn ByteSource>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the status is eligible for another attempt (5xx or 429).
    pub fn is_retryable(&self) -> bool {
        is_retryable_status(self.status)
    }

    /// Take the unread body.
    pub fn into_body(self) -> Box<dyn ByteSource> {
        self.body
    }

    /// Release the body without reading it.
    pub fn discard(mut self) {
        self.body.release();
    }

    /// Read the whole body, then release it.
    pub async fn into_bytes(self) -> Result<Bytes, TransportError> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        let result = loop {
            match body.next_chunk().await {
                Ok(Some(chunk)) => buffer.extend_from_slice(&chunk),
                Ok(None) => break Ok(buffer.freeze()),
                Err(e) => break Err(e),
            }
        };
        body.release();
        result
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// 5xx and 429 are retried; everything else is returned as-is.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Enable gzip decompression.
    pub gzip: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("kestrel/{}", env!("CARGO_PKG_VERSION")),
            pool_max_idle_per_host: 10,
            gzip: true,
        }
    }
}

/// Build a configured HTTP client.
///
/// No overall request timeout is set here: per-attempt deadlines belong to
/// the executor, and streaming bodies may stay open far longer.
pub fn build_client(config: &HttpConfig) -> Result<Client, HttpError> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .pool_max_idle_per_host(config.pool_max_idle_per_host);

    if config.gzip {
        builder = builder.gzip(true);
    }

    builder.build().map_err(HttpError::ClientBuild)
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: Client,
}

impl ReqwestTransport {
    /// Create a transport with default config.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_config(&HttpConfig::default())
    }

    /// Create a transport with custom config.
    pub fn with_config(config: &HttpConfig) -> Result<Self, HttpError> {
        Ok(Self {
            inner: build_client(config)?,
        })
    }

    /// Wrap an existing client.
    pub fn from_client(inner: Client) -> Self {
        Self { inner }
    }

    /// Get the inner reqwest client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<Response, TransportError> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self
            .inner
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = request.body.to_bytes() {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(TransportError::Request)?;
        let status = response.status();
        let headers = response.headers().clone();
        tracing::debug!(status = %status, url = %request.url, "response received");

        Ok(Response::new(
            status,
            headers,
            Box::new(ReqwestBody::new(response)),
        ))
    }
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// [`ByteSource`] over a `reqwest` response body.
pub struct ReqwestBody {
    stream: Option<ChunkStream>,
}

impl ReqwestBody {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Some(Box::pin(response.bytes_stream())),
        }
    }
}

#[async_trait]
impl ByteSource for ReqwestBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(TransportError::Body(e)),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        self.stream = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ChunkSource;

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("kestrel/"));
        assert_eq!(config.pool_max_idle_per_host, 10);
        assert!(config.gzip);
    }

    #[test]
    fn test_build_client() {
        assert!(build_client(&HttpConfig::default()).is_ok());
        assert!(ReqwestTransport::new().is_ok());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::OK));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_into_bytes_concatenates_and_releases() {
        let (source, releases) = ChunkSource::new(vec![Ok("ab"), Ok("cd")]);
        let response = Response::new(StatusCode::OK, HeaderMap::new(), Box::new(source));
        let bytes = response.into_bytes().await.unwrap();
        assert_eq!(bytes, "abcd");
        assert_eq!(releases.count(), 1);
    }

    #[tokio::test]
    async fn test_into_bytes_read_failure_still_releases() {
        let (source, releases) = ChunkSource::new(vec![Ok("ab"), Err("reset")]);
        let response = Response::new(StatusCode::OK, HeaderMap::new(), Box::new(source));
        assert!(response.into_bytes().await.is_err());
        assert_eq!(releases.count(), 1);
    }
}
