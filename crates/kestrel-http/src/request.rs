//! Outbound request types and builders.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;

use crate::error::HttpError;

/// Common HTTP headers.
pub mod headers {
    pub const CONTENT_TYPE_JSON: &str = "application/json";
    pub const CONTENT_TYPE_SSE: &str = "text/event-stream";
    pub const X_CLIENT_ID: &str = "x-client-id";
}

/// Request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Structured body, serialized as JSON on the wire.
    Json(Value),
    /// Opaque body, passed through unserialized.
    Raw(Bytes),
}

impl RequestBody {
    /// Serialize the body for the wire.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Self::Empty => None,
            Self::Json(value) => Some(Bytes::from(value.to_string())),
            Self::Raw(bytes) => Some(bytes.clone()),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }
}

/// `null` is no body and a bare string is sent as-is; any other value is
/// serialized as JSON.
impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(text) => Self::Raw(Bytes::from(text)),
            other => Self::Json(other),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Raw(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(Bytes::from(bytes))
    }
}

/// A fully assembled request. Never mutated once built.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

/// A request builder holding the parts shared by every call of a client.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    headers: HeaderMap,
    base_url: Option<String>,
}

impl RequestBuilder {
    /// Create a new request builder.
    pub fn new() -> Self {
        Self {
            headers: HeaderMap::new(),
            base_url: None,
        }
    }

    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Add a header.
    pub fn header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, HttpError> {
        let header_name = HeaderName::try_from(name.as_ref()).map_err(|e| HttpError::InvalidHeader {
            name: name.as_ref().to_string(),
            message: e.to_string(),
        })?;
        let header_value =
            HeaderValue::try_from(value.as_ref()).map_err(|e| HttpError::InvalidHeader {
                name: name.as_ref().to_string(),
                message: e.to_string(),
            })?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Add bearer token authorization.
    pub fn bearer_auth(mut self, token: impl AsRef<str>) -> Result<Self, HttpError> {
        let mut value = HeaderValue::try_from(format!("Bearer {}", token.as_ref())).map_err(|e| {
            HttpError::InvalidHeader {
                name: AUTHORIZATION.to_string(),
                message: e.to_string(),
            }
        })?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Add the client identity header.
    pub fn client_id(self, id: impl AsRef<str>) -> Result<Self, HttpError> {
        self.header(headers::X_CLIENT_ID, id)
    }

    /// Get the built headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Build the URL.
    pub fn url(&self, path: &str) -> String {
        match &self.base_url {
            Some(base) if path.is_empty() => base.clone(),
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }

    /// Assemble a request for `path`.
    pub fn build(&self, method: Method, path: &str, body: RequestBody) -> RequestDescriptor {
        let mut header_map = self.headers.clone();
        if body.is_json() {
            header_map.insert(
                CONTENT_TYPE,
                HeaderValue::from_static(headers::CONTENT_TYPE_JSON),
            );
        }
        RequestDescriptor {
            method,
            url: self.url(path),
            headers: header_map,
            body,
        }
    }

    /// Assemble a request for `path` that asks for a framed event body.
    pub fn build_stream(&self, method: Method, path: &str, body: RequestBody) -> RequestDescriptor {
        let mut request = self.build(method, path, body);
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static(headers::CONTENT_TYPE_SSE));
        request
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
