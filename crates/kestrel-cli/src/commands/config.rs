//! Config command implementation.

use std::io::{self, Write};

use clap::Parser;
use serde_json::Value;

use crate::cli::CommandContext;
use crate::error::CliError;

/// Print the effective configuration
#[derive(Debug, Parser)]
pub struct ConfigCommand {
    /// Print the API token instead of redacting it
    #[arg(long)]
    pub show_token: bool,
}

impl ConfigCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        let rendered = self.render(ctx)?;
        writeln!(io::stdout(), "{rendered}")?;
        Ok(())
    }

    fn render(&self, ctx: &CommandContext) -> Result<String, CliError> {
        let mut value = serde_json::to_value(&ctx.config).map_err(io::Error::from)?;
        if !self.show_token {
            if let Some(token) = value.get_mut("token") {
                *token = Value::String("<redacted>".to_string());
            }
        }
        Ok(serde_json::to_string_pretty(&value).map_err(io::Error::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_common_config::ClientConfig;

    fn context(token: Option<&str>) -> CommandContext {
        let mut config = ClientConfig::default();
        config.token = token.map(str::to_string);
        CommandContext { config }
    }

    #[test]
    fn test_token_is_redacted() {
        let out = ConfigCommand { show_token: false }
            .render(&context(Some("s3cret")))
            .unwrap();
        assert!(out.contains("<redacted>"));
        assert!(!out.contains("s3cret"));
        assert!(out.contains("\"base_url\": \"http://localhost:8080\""));
    }

    #[test]
    fn test_show_token() {
        let out = ConfigCommand { show_token: true }
            .render(&context(Some("s3cret")))
            .unwrap();
        assert!(out.contains("s3cret"));
    }

    #[test]
    fn test_absent_token_stays_absent() {
        let out = ConfigCommand { show_token: false }.render(&context(None)).unwrap();
        assert!(!out.contains("token"));
    }
}
