use clap::{Args, Parser, Subcommand};

/// The main CLI structure for the chain cursor gateway.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Defines the available subcommands for the application.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway.
    /// This starts the chain subscription and the gRPC server.
    Run(RunCmd),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunCmd {
    #[command(flatten)]
    pub source: ConfigSource,
}

/// Where the configuration comes from. Defaults are used when neither is given.
#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct ConfigSource {
    /// Path to a TOML or JSON configuration file.
    #[arg(short, long)]
    pub config: Option<String>,

    /// The whole configuration as an inline JSON document.
    #[arg(long, value_name = "JSON")]
    pub json: Option<String>,
}
