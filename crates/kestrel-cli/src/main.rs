//! Kestrel CLI.
//!
//! Main entry point for the `kestrel` binary.

use std::process::ExitCode;

use clap::Parser;
use kestrel_common_log::{LogConfig, LogLevel};
use tracing::error;

mod cli;
mod commands;
mod error;

use cli::Cli;
use error::CliError;

/// Application exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exit {
    Success = 0,
    GeneralError = 1,
    ConfigError = 2,
    IoError = 3,
    NetworkError = 4,
    ValidationError = 5,
    AuthError = 6,
    TimeoutError = 7,
    ProtocolError = 8,
    Interrupted = 130,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => return report(CliError::Runtime(e)),
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => Exit::Success.into(),
        Err(e) => report(e),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.load_config()?;
    cli.execute(config).await
}

fn report(e: CliError) -> ExitCode {
    error!("{e}");
    e.exit().into()
}

fn init_logging(cli: &Cli) {
    let config = LogConfig::from_env();
    let config = match (cli.quiet, cli.verbose) {
        (true, _) => config.with_level(LogLevel::Error),
        (false, 0) if std::env::var_os("KESTREL_LOG_LEVEL").is_none() => {
            config.with_level(LogLevel::Warn)
        }
        (false, 0) => config,
        (false, verbose) => config.with_level(LogLevel::from_verbosity(verbose)),
    };

    // Logging failures never block the call.
    if let Err(e) = kestrel_common_log::init(config) {
        eprintln!("kestrel: {e}");
    }
}
