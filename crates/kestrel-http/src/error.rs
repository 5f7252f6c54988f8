//! Error types for the request engine.
//!
//! Every failure a call can produce is a [`NormalizedError`]. Errors raised
//! while constructing a client (before any request exists) use [`HttpError`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a normalized failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure: DNS, TLS, connection reset, broken body stream.
    NetworkError,
    /// The caller cancelled the call.
    RequestAborted,
    /// The per-attempt deadline expired on the final attempt.
    Timeout,
    /// The remote side rejected the credentials.
    Auth,
    /// The remote side rejected the request parameters.
    Params,
    /// A successful response whose body is not JSON.
    InvalidJsonResponse,
}

impl ErrorKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::RequestAborted => "request_aborted",
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::Params => "params",
            Self::InvalidJsonResponse => "invalid_json_response",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure value returned or yielded by the engine.
///
/// Serializes as `{"error": "<kind>"}`, with an optional `message` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    #[serde(rename = "error")]
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NormalizedError {
    /// Create an error of the given kind without detail.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, message: None }
    }

    /// Attach a human-readable detail.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError).with_message(message)
    }

    pub fn aborted() -> Self {
        Self::new(ErrorKind::RequestAborted)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout)
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidJsonResponse).with_message(message)
    }

    /// The failure kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for NormalizedError {}

impl From<ErrorKind> for NormalizedError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result of any call made through the engine.
pub type ApiResult<T> = Result<T, NormalizedError>;

/// Errors raised while building a client.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("invalid base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}
