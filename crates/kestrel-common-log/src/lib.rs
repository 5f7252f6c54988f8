//! Logging infrastructure for Kestrel.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Log file path (if file logging enabled).
    pub file_path: Option<PathBuf>,
    /// Include source location.
    pub source_location: bool,
    /// Include span open/close events.
    pub span_events: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing_subscriber::filter::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
            LogLevel::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
            LogLevel::Info => tracing_subscriber::filter::LevelFilter::INFO,
            LogLevel::Warn => tracing_subscriber::filter::LevelFilter::WARN,
            LogLevel::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        }
    }
}

impl LogLevel {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Level for a `-v` count on top of a base of `warn`.
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => Self::Warn,
            1 => Self::Info,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format.
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// JSON structured format.
    Json,
}

impl LogFormat {
    /// Parse from string; anything unrecognised is `Pretty`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            file_path: None,
            source_location: false,
            span_events: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        let level = std::env::var("KESTREL_LOG_LEVEL").or_else(|_| std::env::var("RUST_LOG"));
        if let Some(level) = level.ok().as_deref().and_then(LogLevel::parse) {
            config.level = level;
        }

        if let Ok(format) = std::env::var("KESTREL_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }

        if let Ok(file_path) = std::env::var("KESTREL_LOG_FILE") {
            config.file_path = Some(PathBuf::from(file_path));
        }

        if let Ok(source_location) = std::env::var("KESTREL_LOG_SOURCE") {
            config.source_location = flag(&source_location);
        }

        if let Ok(span_events) = std::env::var("KESTREL_LOG_SPANS") {
            config.span_events = flag(&span_events);
        }

        config
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

fn flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// Initialize logging with the given configuration.
///
/// Output goes to stderr, and additionally to `file_path` when set. `RUST_LOG`
/// directives, when present and valid, take precedence over `level`.
pub fn init(config: LogConfig) -> Result<(), LogError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let file = match &config.file_path {
        Some(path) => Some(Arc::new(
            std::fs::OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Pretty => {
            let stderr_layer = fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true)
                .with_target(true)
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .with_span_events(span_events.clone());
            let file_layer = file.map(|file| {
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(config.source_location)
                    .with_line_number(config.source_location)
                    .with_span_events(span_events)
            });

            registry.with(stderr_layer).with(file_layer).try_init()
        }
        LogFormat::Compact => {
            let stderr_layer = fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_ansi(true)
                .with_span_events(span_events.clone());
            let file_layer = file.map(|file| {
                fmt::layer()
                    .compact()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_span_events(span_events)
            });

            registry.with(stderr_layer).with(file_layer).try_init()
        }
        LogFormat::Json => {
            let stderr_layer = fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(span_events.clone());
            let file_layer = file.map(|file| {
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_span_events(span_events)
            });

            registry.with(stderr_layer).with(file_layer).try_init()
        }
    }
    .map_err(|e| LogError::InitError(e.to_string()))
}

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to initialize logging: {0}")]
    InitError(String),

    #[error("failed to open log file: {0}")]
    FileError(#[from] io::Error),
}

/// Span helpers for request tracing.
pub mod spans;
