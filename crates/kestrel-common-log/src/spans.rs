//! Span helpers for request tracing.

use tracing::{debug_span, field, info_span, Span};

/// Create a span for one logical API call.
///
/// The `error` field is left empty and filled by [`record_error`].
pub fn request_span(method: &str, path: &str, stream: bool) -> Span {
    info_span!("request", method = %method, path = %path, stream, error = field::Empty)
}

/// Create a span for one attempt of a call.
pub fn attempt_span(attempt: u32, max_retries: u32) -> Span {
    debug_span!("attempt", attempt, max_retries)
}

/// Create a span covering the consumption of a streamed body.
pub fn stream_span(path: &str) -> Span {
    debug_span!("stream", path = %path, frames = field::Empty)
}

/// Record an error on `span`'s `error` field.
pub fn record_error(span: &Span, error: &dyn std::error::Error) {
    span.record("error", field::display(error));
}

/// Timing utility for operations.
pub struct Timer {
    start: std::time::Instant,
    operation: &'static str,
}

impl Timer {
    /// Start a new timer.
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    /// Complete the timer and record duration.
    pub fn finish(self) {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = %self.operation,
            duration_ms = %duration.as_millis(),
            "operation completed"
        );
    }
}
