//! Binary entry point: parses CLI flags into a [`Config`], wires up logging,
//! and runs the [`AppSupervisor`] until a shutdown signal or a fatal error.

use std::process::ExitCode;

use alarmdigest_gateway::{AppSupervisor, CancellationToken, Config};
use clap::Parser;

/// Horizontally-shardable alarm-digest service.
#[derive(Parser, Debug)]
#[command(name = "alarmdigestd", version, about)]
struct Cli {
    /// Addresses of the broker cluster, tried in order with failover.
    #[arg(long = "nats-addr", default_value = "nats://localhost:4222")]
    nats_addr: Vec<String>,

    /// This node's index in the cluster.
    #[arg(long = "shard-id", default_value_t = 0)]
    shard_id: u64,

    /// Total number of shards (nodes) managed by all nodes.
    #[arg(long = "shards", default_value_t = 1)]
    shards: u64,

    /// Number of local-shard workers; defaults to the number of CPUs.
    #[arg(long = "local-shards")]
    local_shards: Option<u64>,

    /// Turns on debug-level logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let local_shards = cli.local_shards.unwrap_or_else(|| num_cpus::get() as u64);

    let config = match Config::new(
        cli.shard_id,
        cli.shards,
        local_shards,
        cli.nats_addr,
        cli.verbose,
    ) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    run(config).await
}

async fn run(config: Config) -> ExitCode {
    let supervisor = AppSupervisor::new(config);
    let token = CancellationToken::new();

    let shutdown_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            shutdown_token.cancel();
        }
    });

    match supervisor.run(token).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "service terminated with an error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}
