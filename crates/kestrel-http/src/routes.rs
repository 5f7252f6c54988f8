//! Statically declared operations.
//!
//! A service is a fixed table of operation name → relative path + allowed
//! verbs, resolved when a call is made rather than by intercepting
//! arbitrary method names.

use reqwest::Method;

use crate::client::ApiCall;
use crate::error::{ApiResult, ErrorKind, NormalizedError};

/// HTTP verb usable in a static table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn to_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }
}

/// One remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub path: &'static str,
    /// Allowed verbs; the first is the default.
    pub verbs: &'static [Verb],
    /// Whether the operation answers with a framed event stream.
    pub stream: bool,
}

impl Operation {
    pub const fn new(name: &'static str, path: &'static str, verbs: &'static [Verb]) -> Self {
        Self {
            name,
            path,
            verbs,
            stream: false,
        }
    }

    pub const fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn allows(&self, verb: Verb) -> bool {
        self.verbs.contains(&verb)
    }

    pub fn default_verb(&self) -> Verb {
        self.verbs.first().copied().unwrap_or(Verb::Post)
    }
}

/// A named group of operations sharing a path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Service {
    pub name: &'static str,
    pub operations: &'static [Operation],
}

impl Service {
    pub const fn new(name: &'static str, operations: &'static [Operation]) -> Self {
        Self { name, operations }
    }

    pub fn resolve(&self, operation: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == operation)
    }

    /// Build a call for `operation`, using its default verb unless one is given.
    pub fn call(&self, operation: &str, verb: Option<Verb>) -> ApiResult<ApiCall> {
        let op = self.resolve(operation).ok_or_else(|| {
            NormalizedError::new(ErrorKind::Params)
                .with_message(format!("unknown operation {}.{}", self.name, operation))
        })?;

        let verb = verb.unwrap_or_else(|| op.default_verb());
        if !op.allows(verb) {
            return Err(NormalizedError::new(ErrorKind::Params).with_message(format!(
                "{:?} not allowed for {}.{}",
                verb, self.name, op.name
            )));
        }

        Ok(ApiCall::new(op.path)
            .method(verb.to_method())
            .stream(op.stream))
    }
}
