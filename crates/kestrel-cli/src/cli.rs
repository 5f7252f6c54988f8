//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};
use kestrel_common_config::{ClientConfig, ConfigLoader, Environment};

use crate::commands::{CallCommand, ConfigCommand};
use crate::error::CliError;

/// Kestrel - resilient client for remote JSON APIs
#[derive(Debug, Parser)]
#[command(
    name = "kestrel",
    author,
    version,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Increase verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all logging except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "KESTREL_CONFIG_PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Call an API path and print the JSON result
    Call(CallCommand),

    /// Print the effective configuration
    Config(ConfigCommand),
}

/// Shared state handed to every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: ClientConfig,
}

impl Cli {
    /// Load `.env` files, then the config file (explicit or project default),
    /// then `KESTREL_*` overrides.
    pub fn load_config(&self) -> Result<ClientConfig, CliError> {
        Environment::init().map_err(|e| CliError::config_source("failed to load .env", e))?;

        ConfigLoader::default()
            .load_with_env(self.config.as_deref())
            .map_err(|e| CliError::config_source("failed to load configuration", e))
    }

    /// Execute the selected command.
    pub async fn execute(self, config: ClientConfig) -> Result<(), CliError> {
        let ctx = CommandContext { config };
        match self.command {
            Command::Call(cmd) => cmd.execute(&ctx).await,
            Command::Config(cmd) => cmd.execute(&ctx),
        }
    }
}
