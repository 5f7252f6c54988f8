//! CLI error handling.

use std::io;

use kestrel_http::{ErrorKind, HttpError, NormalizedError};
use thiserror::Error;

use crate::Exit;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{message}: {source}")]
    Config {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{message}")]
    Usage { message: String },

    #[error("failed to build client: {0}")]
    Client(#[from] HttpError),

    #[error("call failed: {0}")]
    Api(#[from] NormalizedError),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),
}

impl CliError {
    /// Create a config error wrapping its cause.
    pub fn config_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Create a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Get the exit code for this error.
    pub fn exit(&self) -> Exit {
        match self {
            Self::Config { .. } | Self::Client(_) => Exit::ConfigError,
            Self::Usage { .. } => Exit::ValidationError,
            Self::Io(_) => Exit::IoError,
            Self::Runtime(_) => Exit::GeneralError,
            Self::Api(e) => match e.kind() {
                ErrorKind::NetworkError => Exit::NetworkError,
                ErrorKind::Timeout => Exit::TimeoutError,
                ErrorKind::RequestAborted => Exit::Interrupted,
                ErrorKind::Auth => Exit::AuthError,
                ErrorKind::Params => Exit::ValidationError,
                ErrorKind::InvalidJsonResponse => Exit::ProtocolError,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_errors_map_to_exit_codes() {
        let cases = [
            (ErrorKind::NetworkError, 4),
            (ErrorKind::Params, 5),
            (ErrorKind::Auth, 6),
            (ErrorKind::Timeout, 7),
            (ErrorKind::InvalidJsonResponse, 8),
            (ErrorKind::RequestAborted, 130),
        ];
        for (kind, code) in cases {
            let err = CliError::from(NormalizedError::new(kind));
            assert_eq!(err.exit() as u8, code, "{kind}");
        }
    }

    #[test]
    fn test_other_errors_map_to_exit_codes() {
        assert_eq!(CliError::usage("bad body").exit() as u8, 5);
        let io = io::Error::new(io::ErrorKind::BrokenPipe, "closed");
        assert_eq!(CliError::from(io).exit() as u8, 3);
        let config = CliError::config_source(
            "failed to load configuration",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(config.exit() as u8, 2);
        assert!(config.to_string().contains("missing"));
    }
}
