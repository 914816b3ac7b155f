//! Downstream consumers of the chain cursor stream.
//!
//! *   [`consumer::Consumer`]: connects to a gateway, resumes after the last
//!     committed cursor and commits every cursor it receives.
//! *   [`storage`]: where progress is kept, either in `sled` ([`storage::SledStore`])
//!     or in memory ([`storage::MemoryStore`]).

pub mod cli;
pub mod consumer;
pub mod storage;

/// Generated protobuf client code.
pub mod proto {
    tonic::include_proto!("chain_cursor.v1");
}

use anyhow::Result;
use chain_cursor_logger::LogConfig;
use clap::Parser;
use cli::{Cli, Commands};
use consumer::Consumer;
use std::sync::Arc;
use storage::{MemoryStore, SledStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// The main entry point for running a consumer.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    chain_cursor_logger::init(&LogConfig::with_level(cli.log_level))?;

    let consumer = match cli.command {
        Commands::Echo => {
            Consumer::new(cli.server, Arc::new(MemoryStore::with_log_capacity(0))).echo(true)
        }
        Commands::Persist(cmd) => {
            tracing::info!(db_path = %cmd.db_path, name = %cmd.name, "Opening cursor store");
            let store = SledStore::open(&cmd.db_path, &cmd.name)?;
            Consumer::new(cli.server, Arc::new(store))
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C, stopping the consumer...");
                    cancel.cancel();
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to listen for shutdown signal.")
                }
            }
        }
    });

    let committed = consumer.run(cancel).await?;
    tracing::info!(committed, "Consumer stopped.");
    Ok(())
}
