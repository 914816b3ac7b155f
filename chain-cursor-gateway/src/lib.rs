pub mod cli;
pub mod config;
pub mod error;
pub mod grpc;

use anyhow::Result;
use chain_cursor_connector::sources;
use clap::Parser;
use cli::{Cli, Commands};
use config::{load_config, load_config_json, GatewayConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// The main entry point for running the gateway application logic.
/// This function handles CLI parsing, configuration, logging, and service startup.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let Commands::Run(run_cmd) = cli.command;
    let config = load_config_from_cli(run_cmd)?;
    chain_cursor_logger::init(&config.gateway.log)?;
    tracing::info!("Configuration loaded: {:#?}", &config);
    run_server(config).await?;

    Ok(())
}

/// Loads the gateway configuration based on the provided CLI command.
fn load_config_from_cli(run_cmd: cli::RunCmd) -> Result<GatewayConfig> {
    // Logging is not initialized yet, so these go straight to stdout.
    match (run_cmd.source.config, run_cmd.source.json) {
        (Some(config_path), _) => {
            println!("Loading configuration from '{}'", &config_path);
            load_config(&config_path)
        }
        (None, Some(json)) => {
            println!("Loading configuration from inline JSON");
            load_config_json(&json)
        }
        (None, None) => {
            println!("No config file provided, using default settings.");
            Ok(GatewayConfig::default())
        }
    }
}

/// Starts the gRPC server and handles graceful shutdown.
async fn run_server(config: GatewayConfig) -> Result<()> {
    let shutdown = CancellationToken::new();
    let source = sources::from_config(&config.connector, &shutdown);
    let handle = grpc::start(&config, source, shutdown).await?;

    tokio::select! {
        res = signal::ctrl_c() => match res {
            Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown..."),
            Err(err) => tracing::error!(error = %err, "Failed to listen for shutdown signal."),
        },
        _ = handle.stopping() => tracing::warn!("Gateway stopped on its own."),
    }

    handle.stop().await?;
    tracing::info!("Shutdown complete.");
    Ok(())
}
