//! Incremental decoder for `data: <json>` framed response bodies.
//!
//! Bytes are pulled from a [`ByteSource`] one chunk at a time, split into
//! lines by a [`FrameBuffer`], and every `data:` line carrying valid JSON
//! becomes one value. A broken body ends the sequence with a single
//! `network_error`, a cancelled call with a single `request_aborted`;
//! malformed frames are dropped.

use std::collections::VecDeque;
use std::fmt;

use futures_util::Stream;
use serde_json::Value;
use tracing::{Instrument, Span};

use crate::cancel::CancellationWatcher;
use crate::error::{ApiResult, NormalizedError};
use crate::transport::ByteSource;

/// Marker that opens a data frame.
pub const FRAME_MARKER: &str = "data:";

/// Holds the bytes of the current, not yet terminated line.
///
/// After every [`push`](Self::push) the buffer contains no `\n`.
#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order.
    ///
    /// Lines are decoded as UTF-8 only once complete, so a character split
    /// across chunks is reassembled first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);
        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// The bytes of the unterminated tail.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Decode one complete line into a value, if it is a well-formed data frame.
pub fn decode_frame(line: &str) -> Option<Value> {
    let payload = line.trim().strip_prefix(FRAME_MARKER)?.trim();
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, frame = payload, "dropping malformed frame");
            None
        }
    }
}

/// A pull-based sequence of decoded values over one response body.
///
/// The body is released exactly once: at end of data, after a read failure,
/// on cancellation, or when the stream is dropped early.
pub struct EventStream {
    source: Option<Box<dyn ByteSource>>,
    buffer: FrameBuffer,
    ready: VecDeque<Value>,
    frames: u64,
    span: Span,
    cancel: CancellationWatcher,
}

impl EventStream {
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source: Some(source),
            buffer: FrameBuffer::new(),
            ready: VecDeque::new(),
            frames: 0,
            span: Span::none(),
            cancel: CancellationWatcher::never(),
        }
    }

    /// A finished stream holding a single value and no body.
    pub fn once(value: Value) -> Self {
        let mut stream = Self {
            source: None,
            buffer: FrameBuffer::new(),
            ready: VecDeque::new(),
            frames: 0,
            span: Span::none(),
            cancel: CancellationWatcher::never(),
        };
        stream.ready.push_back(value);
        stream
    }

    /// Log reads under `span`; its `frames` field is filled when the body is
    /// released.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// End the sequence with `request_aborted` once `cancel` fires.
    ///
    /// Values decoded before cancellation but not yet pulled are dropped.
    pub fn with_cancel(mut self, cancel: CancellationWatcher) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pull the next value.
    ///
    /// Returns `None` once the body has ended; a read failure is yielded as
    /// one `network_error`, a cancellation as one `request_aborted`, and
    /// either is always the last item.
    pub async fn next(&mut self) -> Option<ApiResult<Value>> {
        let span = self.span.clone();
        self.pull().instrument(span).await
    }

    async fn pull(&mut self) -> Option<ApiResult<Value>> {
        loop {
            if self.source.is_some() && self.cancel.is_cancelled() {
                return Some(Err(self.abort()));
            }

            if let Some(value) = self.ready.pop_front() {
                self.frames += 1;
                return Some(Ok(value));
            }

            let source = self.source.as_mut()?;
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                read = source.next_chunk() => Some(read),
            };

            match read {
                None => return Some(Err(self.abort())),
                Some(Ok(Some(chunk))) => {
                    let lines = self.buffer.push(&chunk);
                    self.ready.extend(lines.iter().filter_map(|line| decode_frame(line)));
                }
                Some(Ok(None)) => {
                    self.finish();
                    return None;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "stream interrupted");
                    self.finish();
                    return Some(Err(NormalizedError::network(e.to_string())));
                }
            }
        }
    }

    fn abort(&mut self) -> NormalizedError {
        tracing::debug!(frames = self.frames, "stream cancelled");
        self.ready.clear();
        self.finish();
        NormalizedError::aborted()
    }

    /// Whether the body has been released and every decoded value consumed.
    pub fn is_finished(&self) -> bool {
        self.source.is_none() && self.ready.is_empty()
    }

    /// Adapt into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = ApiResult<Value>> + Send + 'static {
        futures_util::stream::unfold(self, |mut events| async move {
            let item = events.next().await?;
            Some((item, events))
        })
    }

    fn finish(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            self.span.record("frames", self.frames);
            if !self.buffer.is_empty() {
                tracing::trace!(
                    bytes = self.buffer.pending().len(),
                    "discarding unterminated trailing line"
                );
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("open", &self.source.is_some())
            .field("buffered", &self.buffer.pending().len())
            .field("ready", &self.ready.len())
            .field("frames", &self.frames)
            .finish()
    }
}
