//! Retrying request executor.
//!
//! Runs one logical request through up to `max_retries + 1` sequential
//! attempts. Each attempt races the transport against a self-armed deadline
//! and the caller's cancellation; exactly one of the three wins. Retryable
//! statuses (5xx, 429), transport failures and expired deadlines are retried
//! with exponential backoff. Caller cancellation is never retried, and it
//! also interrupts a pending backoff wait.

use std::sync::Arc;
use std::time::Duration;

use kestrel_common_log::spans;
use tracing::Instrument;

use crate::cancel::CancellationWatcher;
use crate::error::{ApiResult, NormalizedError};
use crate::policy::RetryPolicy;
use crate::request::RequestDescriptor;
use crate::transport::{Response, Transport, TransportError};

/// How a single attempt concluded.
enum AttemptOutcome {
    Response(Response),
    Failed(TransportError),
    DeadlineExpired,
    Aborted,
}

/// Executes requests under a shared [`RetryPolicy`].
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `request`, retrying transient failures.
    ///
    /// Returns the first non-retryable response, or the last response once
    /// attempts run out. Status codes are not interpreted beyond deciding
    /// whether to retry.
    pub async fn execute(
        &self,
        request: &RequestDescriptor,
        timeout_override: Option<Duration>,
        cancel: &CancellationWatcher,
    ) -> ApiResult<Response> {
        let timeout = timeout_override.unwrap_or(self.policy.timeout);
        let mut attempt: u32 = 0;

        loop {
            if let Some(delay) = self.policy.delay_before(attempt) {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(attempt, "cancelled during backoff");
                        return Err(NormalizedError::aborted());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let last = self.policy.is_last_attempt(attempt);
            let span = spans::attempt_span(attempt, self.policy.max_retries);
            let outcome = self
                .attempt(request, timeout, cancel)
                .instrument(span)
                .await;

            match outcome {
                AttemptOutcome::Response(response) if response.is_retryable() && !last => {
                    tracing::warn!(
                        attempt,
                        status = %response.status(),
                        url = %request.url,
                        "retryable status, retrying"
                    );
                    response.discard();
                }
                AttemptOutcome::Response(response) => {
                    tracing::debug!(attempt, status = %response.status(), "attempt completed");
                    return Ok(response);
                }
                AttemptOutcome::Aborted => {
                    tracing::debug!(attempt, url = %request.url, "request aborted by caller");
                    return Err(NormalizedError::aborted());
                }
                AttemptOutcome::DeadlineExpired if last => {
                    tracing::warn!(
                        attempt,
                        timeout_ms = timeout.as_millis() as u64,
                        url = %request.url,
                        "request timed out"
                    );
                    return Err(NormalizedError::timeout());
                }
                AttemptOutcome::DeadlineExpired => {
                    tracing::warn!(
                        attempt,
                        timeout_ms = timeout.as_millis() as u64,
                        "attempt deadline expired, retrying"
                    );
                }
                AttemptOutcome::Failed(e) if last => {
                    tracing::warn!(attempt, error = %e, url = %request.url, "request failed");
                    return Err(NormalizedError::network(e.to_string()));
                }
                AttemptOutcome::Failed(e) => {
                    tracing::warn!(attempt, error = %e, "transport failure, retrying");
                }
            }

            attempt += 1;
        }
    }

    /// One attempt. The deadline timer lives inside this future and is
    /// dropped with it on every exit path.
    async fn attempt(
        &self,
        request: &RequestDescriptor,
        timeout: Duration,
        cancel: &CancellationWatcher,
    ) -> AttemptOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => AttemptOutcome::Aborted,
            result = tokio::time::timeout(timeout, self.transport.send(request)) => match result {
                Ok(Ok(response)) => AttemptOutcome::Response(response),
                Ok(Err(e)) => AttemptOutcome::Failed(e),
                Err(_) => AttemptOutcome::DeadlineExpired,
            },
        }
    }
}
