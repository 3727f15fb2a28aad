//! openapi-proxy
//!
//! Command-line front end for the proxy runtime: resolves configuration,
//! binds the OpenAPI document's operations and lists, calls or inspects them.

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{error, info};

use openapi_proxy::{ConfigSources, ProxyArgs, ProxyRuntime, SpecLoader, merge};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    proxy: ProxyArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Default)]
enum Command {
    /// List the operations exposed by the OpenAPI document (default)
    #[default]
    Operations,

    /// Call one operation and print its response as JSON
    Call {
        /// Operation identifier
        operation_id: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Print the resolved configuration with credentials masked
    Config,
}

/// Initializes structured logging with tracing.
///
/// `MCP_PROXY_LOG_FORMAT=json` selects machine-readable output; anything else
/// gives human-readable logs. Levels come from `RUST_LOG`. Logs go to stderr
/// so stdout only carries command output.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let format = std::env::var("MCP_PROXY_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("openapi_proxy=info"));

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

fn parse_args(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("--args must be valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--args must be a JSON object, got {other}"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let sources = ConfigSources::from_process(cli.proxy);

    match cli.command.unwrap_or_default() {
        Command::Config => {
            let (file, env, flags) = sources.read()?;
            let config = merge(file.as_ref(), &env, &flags)?;
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
        Command::Operations => {
            let runtime = ProxyRuntime::start(&sources, &SpecLoader::new()?).await?;
            for operation in runtime.operations() {
                let summary = if operation.summary.is_empty() {
                    String::new()
                } else {
                    format!("  {}", operation.summary)
                };
                println!(
                    "{}\t{} {}{summary}",
                    operation.operation_id, operation.method, operation.path
                );
            }
            runtime.shutdown();
        }
        Command::Call { operation_id, args } => {
            let args = parse_args(&args)?;
            let runtime = ProxyRuntime::start(&sources, &SpecLoader::new()?).await?;
            let result = runtime.call(&operation_id, &args).await;
            runtime.shutdown();
            let response = result.with_context(|| format!("Operation {operation_id} failed"))?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    info!("Starting openapi-proxy");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_call_subcommand() {
        let cli = Cli::try_parse_from([
            "openapi-proxy",
            "--openapi-spec",
            "petstore.yaml",
            "call",
            "showPet",
            "--args",
            r#"{"petId": 7}"#,
        ])
        .unwrap();

        assert_eq!(cli.proxy.openapi_spec.as_deref(), Some("petstore.yaml"));
        let Some(Command::Call { operation_id, args }) = cli.command else {
            panic!("expected call subcommand");
        };
        assert_eq!(operation_id, "showPet");
        assert_eq!(parse_args(&args).unwrap()["petId"], 7);
    }

    #[test]
    fn test_args_must_be_object() {
        assert!(parse_args("[1, 2]").is_err());
        assert!(parse_args("{").is_err());
        assert!(parse_args("{}").unwrap().is_empty());
    }
}
