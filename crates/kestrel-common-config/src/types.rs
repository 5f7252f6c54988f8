//! Configuration types.

use serde::{Deserialize, Serialize};

/// Root configuration for an API client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every call path is joined onto.
    pub base_url: String,
    /// Bearer token sent on every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Value of the client identity header.
    pub client_id: String,
    /// Retry and per-attempt deadline settings.
    pub retry: RetrySettings,
    /// Connection deadline for streaming calls (ms).
    pub stream_timeout_ms: u64,
    /// Status codes rejected without reading the body.
    pub status: StatusSettings,
    /// Transport settings.
    pub http: HttpSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: None,
            client_id: "kestrel".to_string(),
            retry: RetrySettings::default(),
            stream_timeout_ms: 120_000,
            status: StatusSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry (ms).
    pub backoff_base_ms: u64,
    /// Multiplier applied to the delay per retry.
    pub backoff_factor: f64,
    /// Per-attempt deadline (ms).
    pub timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_factor: 2.0,
            timeout_ms: 30_000,
        }
    }
}

/// Status codes mapped to `auth` and `params` failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    pub auth: Vec<u16>,
    pub params: Vec<u16>,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            auth: vec![401, 403],
            params: vec![400, 422],
        }
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Connection timeout (ms).
    pub connect_timeout_ms: u64,
    /// Overrides the default user agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Enable gzip decompression.
    pub gzip: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            user_agent: None,
            pool_max_idle_per_host: 10,
            gzip: true,
        }
    }
}
