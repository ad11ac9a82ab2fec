//! `bridged`: host-side executor for the file bridge.

use std::path::PathBuf;
use std::sync::Arc;

use bridge_core::{init_tracing, BridgeConfig, ChannelPair};
use bridge_executor::{host, ExecutorLoop, PassOutcome};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Host-side executor for the file bridge", long_about = None)]
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
    /// Directory actions run in and queries describe.
    #[arg(long, env = "BRIDGE_PROJECT", value_name = "DIR", default_value = ".")]
    project: PathBuf,
    /// Subcommand.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single pass and exit (for hosts that trigger the executor themselves).
    Once,
    /// Keep running passes on a timer until interrupted.
    Watch {
        /// Milliseconds between passes.
        #[arg(long, env = "BRIDGE_TRIGGER_INTERVAL_MS")]
        interval_ms: Option<u64>,
    },
    /// List the queries this executor answers.
    Queries,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_level.as_deref())?;

    let mut config = BridgeConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.dir {
        config.base_dir = dir;
    }

    let capability = host::project_capability(&cli.project, &config.base_dir)?;
    if let Commands::Queries = cli.command {
        for name in capability.query_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let channels = ChannelPair::open(&config.base_dir)?;
    let executor = ExecutorLoop::new(channels, Arc::new(capability));
    info!(dir = %config.base_dir.display(), "bridge executor ready");

    match cli.command {
        Commands::Once => match executor.poll_once()? {
            PassOutcome::Idle => println!("No commands waiting."),
            PassOutcome::Deferred => println!("Command file is not readable yet; try again."),
            PassOutcome::Rejected => println!(
                "Command file can never be processed; clear it with `bridgectl reset --yes`."
            ),
            PassOutcome::Responded(status) => println!("Command processed: {status}"),
        },
        Commands::Watch { interval_ms } => {
            if let Some(ms) = interval_ms {
                config.trigger_interval_ms = ms;
            }
            executor
                .run_until(config.trigger_interval(), async {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        tracing::error!(%err, "failed to listen for ctrl-c");
                    }
                })
                .await;
        }
        Commands::Queries => {}
    }
    Ok(())
}
