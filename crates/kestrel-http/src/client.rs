//! Request orchestration: one entry point for plain and streaming calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kestrel_common_config::ClientConfig;
use kestrel_common_log::spans;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{Instrument, Span};

use crate::cancel::CancellationWatcher;
use crate::decoder::EventStream;
use crate::error::{ApiResult, ErrorKind, HttpError, NormalizedError};
use crate::executor::Executor;
use crate::policy::RetryPolicy;
use crate::request::{RequestBody, RequestBuilder};
use crate::routes::{Service, Verb};
use crate::transport::{HttpConfig, ReqwestTransport, Response, Transport};

/// Default connection budget for streaming calls.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// One call to the remote API.
#[derive(Debug, Clone)]
pub struct ApiCall {
    /// Path relative to the client's base URL.
    pub path: String,
    pub method: Method,
    pub body: RequestBody,
    /// Answer with an [`EventStream`] instead of a parsed value.
    pub stream: bool,
    /// Per-attempt deadline override.
    pub timeout: Option<Duration>,
    pub cancel: CancellationWatcher,
}

impl ApiCall {
    /// A POST to `path` with no body.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::POST,
            body: RequestBody::Empty,
            stream: false,
            timeout: None,
            cancel: CancellationWatcher::never(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel(mut self, cancel: CancellationWatcher) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What a successful call produced.
#[derive(Debug)]
pub enum ApiOutput {
    Value(Value),
    Stream(EventStream),
}

impl ApiOutput {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<EventStream> {
        match self {
            Self::Stream(stream) => Some(stream),
            Self::Value(_) => None,
        }
    }
}

/// Statuses the remote side uses to reject a call outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMap {
    pub auth: Vec<u16>,
    pub params: Vec<u16>,
}

impl Default for StatusMap {
    fn default() -> Self {
        Self {
            auth: vec![401, 403],
            params: vec![400, 422],
        }
    }
}

impl StatusMap {
    pub fn classify(&self, status: StatusCode) -> Option<ErrorKind> {
        let code = status.as_u16();
        if self.auth.contains(&code) {
            Some(ErrorKind::Auth)
        } else if self.params.contains(&code) {
            Some(ErrorKind::Params)
        } else {
            None
        }
    }
}

/// Client for the remote JSON API.
#[derive(Clone)]
pub struct ApiClient {
    executor: Executor,
    requests: RequestBuilder,
    status_map: StatusMap,
    stream_timeout: Duration,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        requests: RequestBuilder,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            executor: Executor::new(transport, policy),
            requests,
            status_map: StatusMap::default(),
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }

    /// Build a client over `reqwest` from loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, HttpError> {
        url::Url::parse(&config.base_url).map_err(|source| HttpError::InvalidBaseUrl {
            url: config.base_url.clone(),
            source,
        })?;

        let mut http = HttpConfig {
            connect_timeout: Duration::from_millis(config.http.connect_timeout_ms),
            pool_max_idle_per_host: config.http.pool_max_idle_per_host,
            gzip: config.http.gzip,
            ..HttpConfig::default()
        };
        if let Some(user_agent) = &config.http.user_agent {
            http.user_agent = user_agent.clone();
        }
        let transport = ReqwestTransport::with_config(&http)?;

        let mut requests = RequestBuilder::new()
            .base_url(&config.base_url)
            .client_id(&config.client_id)?;
        if let Some(token) = &config.token {
            requests = requests.bearer_auth(token)?;
        }

        let policy = RetryPolicy::new(
            config.retry.max_retries,
            Duration::from_millis(config.retry.backoff_base_ms),
            config.retry.backoff_factor,
            Duration::from_millis(config.retry.timeout_ms),
        );

        Ok(Self::new(Arc::new(transport), requests, policy)
            .with_stream_timeout(Duration::from_millis(config.stream_timeout_ms))
            .with_status_map(StatusMap {
                auth: config.status.auth.clone(),
                params: config.status.params.clone(),
            }))
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_status_map(mut self, status_map: StatusMap) -> Self {
        self.status_map = status_map;
        self
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn stream_timeout(&self) -> Duration {
        self.stream_timeout
    }

    /// Make a call.
    ///
    /// Plain calls resolve to a parsed JSON value. Streaming calls retry only
    /// the initial connection and resolve to an [`EventStream`] over the body.
    pub async fn call(&self, call: ApiCall) -> ApiResult<ApiOutput> {
        let span = spans::request_span(call.method.as_str(), &call.path, call.stream);
        traced(span, self.dispatch(call)).await
    }

    async fn dispatch(&self, call: ApiCall) -> ApiResult<ApiOutput> {
        let stream = call.stream;
        let path = call.path.clone();
        let opened = self.open(call).await?;

        if stream && opened.response.status().is_success() {
            tracing::debug!(status = %opened.response.status(), "stream opened");
            let events = EventStream::new(opened.response.into_body())
                .with_span(spans::stream_span(&path))
                .with_cancel(opened.cancel);
            return Ok(ApiOutput::Stream(events));
        }

        opened.read_json().await.map(ApiOutput::Value)
    }

    /// Send `call` through the executor and reject statuses in the status map.
    async fn open(&self, call: ApiCall) -> ApiResult<Opened> {
        let ApiCall {
            path,
            method,
            body,
            stream,
            timeout,
            cancel,
        } = call;

        let (request, timeout) = if stream {
            (
                self.requests.build_stream(method, &path, body),
                timeout.unwrap_or(self.stream_timeout),
            )
        } else {
            (
                self.requests.build(method, &path, body),
                timeout.unwrap_or(self.executor.policy().timeout),
            )
        };

        let response = self.executor.execute(&request, Some(timeout), &cancel).await?;
        let status = response.status();

        if let Some(kind) = self.status_map.classify(status) {
            tracing::debug!(status = %status, kind = %kind, "remote rejected request");
            response.discard();
            return Err(NormalizedError::new(kind).with_message(format!("status {status}")));
        }

        Ok(Opened {
            response,
            timeout,
            cancel,
        })
    }

    /// Plain call to `path` with `body`, resolving to the parsed response.
    pub async fn request_json(&self, path: &str, body: impl Into<RequestBody>) -> ApiResult<Value> {
        let call = ApiCall::new(path).body(body);
        let span = spans::request_span(call.method.as_str(), &call.path, false);
        traced(span, async { self.open(call).await?.read_json().await }).await
    }

    /// Streaming call to `path` with `body`.
    ///
    /// A non-2xx answer outside the status map carries no frames; its JSON
    /// document is the single value of the returned stream.
    pub async fn request_stream(
        &self,
        path: &str,
        body: impl Into<RequestBody>,
    ) -> ApiResult<EventStream> {
        match self.call(ApiCall::new(path).body(body).stream(true)).await? {
            ApiOutput::Stream(stream) => Ok(stream),
            ApiOutput::Value(value) => Ok(EventStream::once(value)),
        }
    }

    /// Call a statically declared operation of `service`.
    pub async fn invoke(
        &self,
        service: &Service,
        operation: &str,
        verb: Option<Verb>,
        body: impl Into<RequestBody>,
    ) -> ApiResult<ApiOutput> {
        let call = service.call(operation, verb)?.body(body);
        self.call(call).await
    }
}

/// A response that passed status classification.
struct Opened {
    response: Response,
    timeout: Duration,
    cancel: CancellationWatcher,
}

impl Opened {
    /// Read the whole body and parse it as JSON.
    async fn read_json(self) -> ApiResult<Value> {
        let bytes = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(NormalizedError::aborted()),
            read = tokio::time::timeout(self.timeout, self.response.into_bytes()) => match read {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => return Err(NormalizedError::network(e.to_string())),
                Err(_) => return Err(NormalizedError::timeout()),
            },
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::debug!(error = %e, bytes = bytes.len(), "response body is not JSON");
            NormalizedError::invalid_json(e.to_string())
        })
    }
}

async fn traced<T>(span: Span, call: impl Future<Output = ApiResult<T>>) -> ApiResult<T> {
    let result = call.instrument(span.clone()).await;
    if let Err(e) = &result {
        spans::record_error(&span, e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::routes::Operation;
    use crate::testing::{ScriptedTransport, Step};
    use serde_json::json;

    fn client(transport: &Arc<ScriptedTransport>) -> ApiClient {
        let requests = RequestBuilder::new()
            .base_url("https://api.example.com")
            .bearer_auth("secret")
            .unwrap();
        let policy = RetryPolicy::new(2, Duration::from_millis(10), 2.0, Duration::from_secs(1));
        ApiClient::new(transport.clone(), requests, policy)
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_call_parses_json() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(200, r#"{"ok":true}"#)]));
        let value = client(&transport).request_json("/v1/ping", json!({})).await.unwrap();
        assert_eq!(value, json!({ "ok": true }));
        assert_eq!(transport.releases().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_body_is_invalid_json_response() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(
            200,
            "<html>oops</html>",
        )]));
        let err = client(&transport).request_json("/v1/ping", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidJsonResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_and_params_statuses() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::status(401)]));
        let err = client(&transport).request_json("/v1/me", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(transport.attempt_count(), 1);

        let transport = Arc::new(ScriptedTransport::new(vec![Step::status(422)]));
        let err = client(&transport).request_json("/v1/me", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Params);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_status_returns_remote_json() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(
            404,
            r#"{"error":"not_found"}"#,
        )]));
        let value = client(&transport).request_json("/v1/missing", json!({})).await.unwrap();
        assert_eq!(value, json!({ "error": "not_found" }));
        assert_eq!(transport.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_hand_last_response_to_interpretation() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(
            503,
            "Service Unavailable",
        )]));
        let err = client(&transport).request_json("/v1/ping", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidJsonResponse);
        assert_eq!(transport.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_call_returns_decoder() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Respond(
            200,
            vec!["data: {\"a", "\":1}\n\ndata: {\"b\":2}\n"],
        )]));
        let mut events = client(&transport).request_stream("/v1/stream", json!({})).await.unwrap();
        assert_eq!(events.next().await, Some(Ok(json!({ "a": 1 }))));
        assert_eq!(events.next().await, Some(Ok(json!({ "b": 2 }))));
        assert_eq!(events.next().await, None);
        assert_eq!(transport.releases().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_connection_failure_never_builds_decoder() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Fail("refused")]));
        let output = client(&transport)
            .call(ApiCall::new("/v1/stream").stream(true))
            .await;
        assert_eq!(output.unwrap_err().kind(), ErrorKind::NetworkError);
        assert_eq!(transport.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_uses_stream_timeout() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Hang]));
        let client = client(&transport).with_stream_timeout(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        let err = client
            .call(ApiCall::new("/v1/stream").stream(true))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        // Three attempts of 5s plus 10ms and 20ms of backoff.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(15_030));
        assert!(elapsed < Duration::from_millis(15_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_with_rejected_status_is_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::status(403)]));
        let err = client(&transport)
            .request_stream("/v1/stream", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_with_unsuccessful_status_is_not_decoded() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(
            404,
            r#"{"error":"no_such_stream"}"#,
        )]));
        let output = client(&transport)
            .call(ApiCall::new("/v1/stream").stream(true))
            .await
            .unwrap();
        assert_eq!(output.into_value(), Some(json!({ "error": "no_such_stream" })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_stream_yields_remote_document() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(
            503,
            r#"{"error":"overloaded"}"#,
        )]));
        let mut events = client(&transport)
            .request_stream("/v1/stream", json!({}))
            .await
            .unwrap();
        assert_eq!(events.next().await, Some(Ok(json!({ "error": "overloaded" }))));
        assert_eq!(events.next().await, None);
        assert_eq!(transport.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_call_asks_for_event_stream() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Respond(200, vec![])]));
        client(&transport).request_stream("/v1/stream", json!({})).await.unwrap();
        let request = transport.last_request().unwrap();
        assert_eq!(
            request.headers.get(reqwest::header::ACCEPT).unwrap(),
            crate::request::headers::CONTENT_TYPE_SSE
        );

        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(200, "{}")]));
        client(&transport).request_json("/v1/ping", json!({})).await.unwrap();
        let request = transport.last_request().unwrap();
        assert!(request.headers.get(reqwest::header::ACCEPT).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_stream_opened_ends_stream() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Respond(
            200,
            vec!["data: 1\n", "data: 2\n"],
        )]));
        let (token, watcher) = CancellationToken::new();
        let mut events = client(&transport)
            .call(ApiCall::new("/v1/stream").stream(true).cancel(watcher))
            .await
            .unwrap()
            .into_stream()
            .unwrap();

        assert_eq!(events.next().await, Some(Ok(json!(1))));
        token.cancel();

        let err = events.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestAborted);
        assert_eq!(events.next().await, None);
        assert_eq!(transport.releases().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_is_request_aborted() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Hang]));
        let (token, watcher) = CancellationToken::new();
        token.cancel();
        let err = client(&transport)
            .call(ApiCall::new("/v1/ping").cancel(watcher))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestAborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_static_operation() {
        static USERS: Service = Service::new(
            "users",
            &[Operation::new("info", "/users.info", &[Verb::Get])],
        );
        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(200, r#"{"id":"u1"}"#)]));
        let client = client(&transport);

        let output = client.invoke(&USERS, "info", None, RequestBody::Empty).await.unwrap();
        assert_eq!(output.into_value(), Some(json!({ "id": "u1" })));

        let err = client
            .invoke(&USERS, "info", Some(Verb::Delete), RequestBody::Empty)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Params);
        assert_eq!(transport.attempt_count(), 1);
    }

    #[test]
    fn test_status_map_default() {
        let map = StatusMap::default();
        assert_eq!(map.classify(StatusCode::UNAUTHORIZED), Some(ErrorKind::Auth));
        assert_eq!(map.classify(StatusCode::FORBIDDEN), Some(ErrorKind::Auth));
        assert_eq!(map.classify(StatusCode::BAD_REQUEST), Some(ErrorKind::Params));
        assert_eq!(map.classify(StatusCode::UNPROCESSABLE_ENTITY), Some(ErrorKind::Params));
        assert_eq!(map.classify(StatusCode::NOT_FOUND), None);
        assert_eq!(map.classify(StatusCode::OK), None);
    }

    #[test]
    fn test_from_config() {
        let mut config = ClientConfig::default();
        config.token = Some("abc".to_string());
        config.stream_timeout_ms = 5_000;
        let client = ApiClient::from_config(&config).unwrap();
        assert_eq!(client.stream_timeout(), Duration::from_secs(5));
        assert_eq!(client.executor().policy().max_retries, config.retry.max_retries);
    }

    #[test]
    fn test_from_config_rejects_bad_base_url() {
        let mut config = ClientConfig::default();
        config.base_url = "not a url".to_string();
        assert!(matches!(
            ApiClient::from_config(&config),
            Err(HttpError::InvalidBaseUrl { .. })
        ));
    }
}
