//! Scripted transports and byte sources for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tokio::time::Instant;

use crate::request::RequestDescriptor;
use crate::transport::{ByteSource, Response, Transport, TransportError};

/// Counts `release()` calls across clones.
#[derive(Clone, Debug, Default)]
pub struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A body that yields scripted chunks; `Err` entries fail the pull.
pub struct ChunkSource {
    chunks: VecDeque<Result<Bytes, String>>,
    stall: bool,
    released: bool,
    releases: ReleaseCounter,
}

impl ChunkSource {
    pub fn new(chunks: Vec<Result<&'static str, &'static str>>) -> (Self, ReleaseCounter) {
        Self::from_bytes(
            chunks
                .into_iter()
                .map(|c| c.map(|s| s.as_bytes().to_vec()))
                .collect(),
        )
    }

    pub fn from_bytes(chunks: Vec<Result<Vec<u8>, &'static str>>) -> (Self, ReleaseCounter) {
        let releases = ReleaseCounter::default();
        (Self::with_counter(chunks, releases.clone()), releases)
    }

    /// Like [`new`](Self::new), but never ends once the chunks run out.
    pub fn stalling(chunks: Vec<Result<&'static str, &'static str>>) -> (Self, ReleaseCounter) {
        let (mut source, releases) = Self::new(chunks);
        source.stall = true;
        (source, releases)
    }

    fn with_counter(chunks: Vec<Result<Vec<u8>, &'static str>>, releases: ReleaseCounter) -> Self {
        Self {
            chunks: chunks
                .into_iter()
                .map(|c| c.map(Bytes::from).map_err(str::to_string))
                .collect(),
            stall: false,
            released: false,
            releases,
        }
    }
}

#[async_trait]
impl ByteSource for ChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.released {
            return Ok(None);
        }
        match self.chunks.pop_front() {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(message)) => Err(TransportError::Other(message)),
            None if self.stall => std::future::pending().await,
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        self.released = true;
        self.releases.bump();
    }
}

/// What the scripted transport does on one attempt.
#[derive(Clone, Debug)]
pub enum Step {
    /// Respond with a status and a body made of these chunks.
    Respond(u16, Vec<&'static str>),
    /// Fail at the transport level.
    Fail(&'static str),
    /// Never respond.
    Hang,
}

impl Step {
    pub fn status(code: u16) -> Self {
        Self::Respond(code, Vec::new())
    }

    pub fn json(code: u16, body: &'static str) -> Self {
        Self::Respond(code, vec![body])
    }
}

/// Replays `steps` in order, repeating the last one once exhausted.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    attempts: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<RequestDescriptor>>,
    releases: ReleaseCounter,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            releases: ReleaseCounter::default(),
        }
    }

    /// Instants at which each attempt started.
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// The most recently sent request.
    pub fn last_request(&self) -> Option<RequestDescriptor> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Release calls across every body this transport produced.
    pub fn releases(&self) -> ReleaseCounter {
        self.releases.clone()
    }

    fn next_step(&self) -> Step {
        self.attempts.lock().unwrap().push(Instant::now());
        let mut last = self.last.lock().unwrap();
        match self.steps.lock().unwrap().pop_front() {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Step::Hang),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<Response, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.next_step() {
            Step::Respond(code, chunks) => {
                let body = ChunkSource::with_counter(
                    chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec())).collect(),
                    self.releases.clone(),
                );
                let status = StatusCode::from_u16(code)
                    .map_err(|e| TransportError::other(e.to_string()))?;
                Ok(Response::new(status, HeaderMap::new(), Box::new(body)))
            }
            Step::Fail(message) => Err(TransportError::other(message)),
            Step::Hang => std::future::pending().await,
        }
    }
}
