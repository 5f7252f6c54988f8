//! Call command implementation.

use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use kestrel_common_log::spans::Timer;
use kestrel_http::{
    ApiCall, ApiClient, ApiOutput, CancellationToken, NormalizedError, RequestBody, Verb,
};
use serde_json::Value;

use crate::cli::CommandContext;
use crate::error::CliError;

/// HTTP method accepted on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MethodArg {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl From<MethodArg> for Verb {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Get => Verb::Get,
            MethodArg::Post => Verb::Post,
            MethodArg::Put => Verb::Put,
            MethodArg::Patch => Verb::Patch,
            MethodArg::Delete => Verb::Delete,
        }
    }
}

/// Call an API path and print the JSON result
#[derive(Debug, Parser)]
pub struct CallCommand {
    /// Path relative to the configured base URL
    pub path: String,

    /// HTTP method
    #[arg(short = 'X', long, value_enum, default_value = "post")]
    pub method: MethodArg,

    /// JSON request body
    #[arg(short, long)]
    pub body: Option<String>,

    /// Decode the response as a stream of `data:` frames, one value per line
    #[arg(short, long)]
    pub stream: bool,

    /// Per-attempt deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Pretty-print a non-streaming result
    #[arg(long)]
    pub pretty: bool,
}

impl CallCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        let body = self.request_body()?;
        let client = ApiClient::from_config(&ctx.config)?;

        let (token, watcher) = CancellationToken::new();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling call");
                token.cancel();
            }
        });

        let mut call = ApiCall::new(&self.path)
            .method(Verb::from(self.method).to_method())
            .body(body)
            .stream(self.stream)
            .cancel(watcher);
        if let Some(timeout_ms) = self.timeout_ms {
            call = call.timeout(Duration::from_millis(timeout_ms));
        }

        let timer = Timer::start("call");
        let result = self.run(&client, call).await;
        timer.finish();
        interrupt.abort();

        if let Err(CliError::Api(e)) = &result {
            print_error(e)?;
        }
        result
    }

    fn request_body(&self) -> Result<RequestBody, CliError> {
        match &self.body {
            Some(text) => serde_json::from_str::<Value>(text)
                .map(RequestBody::from)
                .map_err(|e| CliError::usage(format!("--body is not valid JSON: {e}"))),
            None => Ok(RequestBody::Empty),
        }
    }

    async fn run(&self, client: &ApiClient, call: ApiCall) -> Result<(), CliError> {
        let mut out = io::stdout();

        let mut events = match client.call(call).await? {
            ApiOutput::Value(value) => return write_value(&mut out, &value, self.pretty),
            ApiOutput::Stream(events) => events,
        };

        while let Some(item) = events.next().await {
            write_value(&mut out, &item?, false)?;
        }
        Ok(())
    }
}

fn write_value(out: &mut impl Write, value: &Value, pretty: bool) -> Result<(), CliError> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(io::Error::from)?;
    writeln!(out, "{text}")?;
    out.flush()?;
    Ok(())
}

fn print_error(error: &NormalizedError) -> Result<(), CliError> {
    let text = serde_json::to_string(error).map_err(io::Error::from)?;
    writeln!(io::stdout(), "{text}")?;
    Ok(())
}
