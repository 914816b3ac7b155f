use clap::{Args, Parser, Subcommand};

/// The main CLI structure for the chain cursor consumers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// gRPC endpoint of the gateway.
    #[arg(long, global = true, default_value = "http://127.0.0.1:50051")]
    pub server: String,

    /// Log filter, e.g. "info" or "chain_cursor_consumer=debug".
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Defines the available subcommands for the application.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print every cursor, starting at the chain's latest.
    Echo,
    /// Record every cursor in a sled database and resume from it on restart.
    Persist(PersistCmd),
}

/// Arguments for the `persist` subcommand.
#[derive(Args, Debug)]
pub struct PersistCmd {
    /// Path to the sled database directory.
    #[arg(long, default_value = "./chain_cursor_consumer.db")]
    pub db_path: String,

    /// Consumer name; keys in the database are namespaced by it.
    #[arg(long, default_value = "default")]
    pub name: String,
}
