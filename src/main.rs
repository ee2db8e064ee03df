#![forbid(unsafe_code)]

//! `tool-gateway` — operator CLI for the tool gateway.
//!
//! Loads configuration, then calls a tool, probes health, or prints the
//! effective allowlist. Results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use tool_gateway::{AppError, FileConfigSource, Result, ToolGateway};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "tool-gateway",
    about = "Allowlisted stdio tool gateway",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file; `TOOL_GATEWAY_*` variables override it.
    #[arg(long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Call a tool and print its result.
    Call {
        /// Tool name.
        tool: String,

        /// Tool arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,

        /// Skip the allowlist check.
        #[arg(long)]
        raw: bool,
    },

    /// Probe the helper and print a health report.
    Health,

    /// Print the allowlist in effect.
    Allowlist,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(kind = err.kind(), %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let source = FileConfigSource::new(&args.config);
    info!(config = %source.path().display(), "tool-gateway starting");
    let gateway = ToolGateway::new(Arc::new(source));

    let output = match args.command {
        Command::Call { tool, args, raw } => {
            let arguments: Value = serde_json::from_str(&args).map_err(|err| {
                AppError::InvalidInput(format!("--args is not valid JSON: {err}"))
            })?;
            if raw {
                gateway.call_tool(&tool, arguments).await?
            } else {
                gateway.call_allowed_tool(&tool, arguments).await?
            }
        }
        Command::Health => to_json(&gateway.health().await)?,
        Command::Allowlist => {
            let allowlist = gateway.allowed_tools()?;
            Value::from(allowlist.names().collect::<Vec<_>>())
        }
    };

    let rendered = serde_json::to_string_pretty(&output)
        .map_err(|err| AppError::Io(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|err| AppError::Io(format!("failed to encode output: {err}")))
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
