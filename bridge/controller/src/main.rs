//! `bridgectl`: submit commands to a running bridge executor.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use bridge_controller::{BridgeTools, ControllerClient, ToolSurface};
use bridge_core::{init_tracing, BridgeConfig};
use bridge_spec::{QueryParams, Response};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::{io::AsyncBufReadExt, io::BufReader, select};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Controller for the file bridge", long_about = None)]
struct Cli {
    /// Increase output verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Override log level (e.g. info, debug, trace).
    #[arg(long, env = "BRIDGE_LOG_LEVEL")]
    log_level: Option<String>,
    /// JSON settings file.
    #[arg(long, env = "BRIDGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
    /// Bridge directory holding command.json and response.json.
    #[arg(long, env = "BRIDGE_DIR", value_name = "DIR")]
    dir: Option<PathBuf>,
    /// Seconds to wait for a response.
    #[arg(long, env = "BRIDGE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
    /// Milliseconds between response checks.
    #[arg(long, env = "BRIDGE_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,
    /// Milliseconds to wait between seeing a response and reading it.
    #[arg(long, env = "BRIDGE_GRACE_MS")]
    grace_ms: Option<u64>,
    /// Subcommand.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an action on the host.
    Action {
        /// Action text; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        code: Vec<String>,
    },
    /// Ask the host a named question.
    Query {
        /// Query name.
        name: String,
        /// Parameter as key=value; the value is parsed as JSON when it can be.
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    /// Show whether command or response files are pending.
    Status,
    /// Delete both channel files.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
    /// Interactive prompt.
    Shell,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_level.as_deref())?;

    let mut config = BridgeConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.dir {
        config.base_dir = dir;
    }
    if let Some(secs) = cli.timeout_secs {
        config.timeout_secs = secs;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    if let Some(ms) = cli.grace_ms {
        config.grace_ms = ms;
    }

    let client = ControllerClient::from_config(&config)?;
    let tools = BridgeTools::new(client.clone());

    match cli.command {
        Commands::Action { code } => {
            let response = client
                .submit(bridge_spec::Command::execute(code.join(" ")))
                .await?;
            Ok(report(&response))
        }
        Commands::Query { name, params } => {
            let params = parse_params(&params)?;
            let response = tools.run_query_with(&name, params).await?;
            Ok(report(&response))
        }
        Commands::Status => {
            let status = client.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes pending channel files; pass --yes to confirm");
            }
            let cleared = client.reset()?;
            println!(
                "cleared command: {}, response: {}",
                cleared.command_pending, cleared.response_pending
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Shell => {
            run_shell(&tools).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report(response: &Response) -> ExitCode {
    println!("{response}");
    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn parse_params(raw: &[String]) -> anyhow::Result<QueryParams> {
    let mut params = QueryParams::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("parameter {pair:?} is not KEY=VALUE"))?;
        if key.is_empty() {
            bail!("parameter {pair:?} has an empty key");
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}

/// Split `line` on whitespace, keeping double-quoted runs (quotes included)
/// inside one word so `kind="a b"` reaches [`parse_params`] intact.
fn split_words(line: &str) -> anyhow::Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in line.chars() {
        if in_quotes {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_quotes = false;
            }
        } else if ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            if ch == '"' {
                in_quotes = true;
            }
            current.push(ch);
        }
    }
    if in_quotes {
        bail!("unterminated quote in {line:?}");
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

fn parse_query_line(rest: &str) -> anyhow::Result<(String, QueryParams)> {
    let mut words = split_words(rest)?.into_iter();
    let name = words
        .next()
        .context("usage: query <name> [key=value ...]")?;
    let raw: Vec<String> = words.collect();
    Ok((name, parse_params(&raw)?))
}

async fn run_shell(tools: &BridgeTools) -> anyhow::Result<()> {
    info!("bridge shell ready. Type :help for commands.");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        select! {
            maybe_line = lines.next_line() => {
                let Some(line) = maybe_line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.starts_with(":help") {
                    println!(
                        "Commands: :help, :status, :quit, action <text>, \
                         query <name> [key=value ...]"
                    );
                    println!("Quote values containing spaces as JSON strings: kind=\"a b\"");
                    continue;
                }
                if line.starts_with(":quit") {
                    break;
                }
                if line.starts_with(":status") {
                    match tools.client().status() {
                        Ok(status) => println!(
                            "command pending: {}, response pending: {}",
                            status.command_pending, status.response_pending
                        ),
                        Err(err) => println!("status failed: {err}"),
                    }
                    continue;
                }
                if let Some(code) = line.strip_prefix("action ") {
                    match tools.run_action(code.trim()).await {
                        Ok(text) => println!("{text}"),
                        Err(err) => println!("action failed: {err}"),
                    }
                    continue;
                }
                if let Some(rest) = line.strip_prefix("query ") {
                    let (name, params) = match parse_query_line(rest) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            println!("{err}");
                            continue;
                        }
                    };
                    match tools.run_query_with(&name, params).await {
                        Ok(response) => println!("{response}"),
                        Err(err) => println!("query failed: {err}"),
                    }
                    continue;
                }
                println!("unrecognized input. try :help");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
