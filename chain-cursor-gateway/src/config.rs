use anyhow::{Context, Result};
use chain_cursor_connector::config::ConnectorConfig;
use chain_cursor_logger::LogConfig;
use serde::Deserialize;

/// Environment variables override file settings, e.g. `CHAIN_CURSOR__GATEWAY__GRPC__PORT`.
const ENV_PREFIX: &str = "CHAIN_CURSOR";

/// The top-level configuration for the gateway application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayConfig {
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub gateway: GatewaySpecificConfig,
}

/// Contains settings that are unique to the gateway binary.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct GatewaySpecificConfig {
    #[serde(default)]
    pub grpc: GrpcConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// gRPC server connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GrpcConfig {
    pub host: String,
    pub port: u16,
}

/// Per-connection streaming settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StreamingConfig {
    /// Number of cursors buffered for a client before delivery waits on it.
    pub output_stream_capacity: usize,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            output_stream_capacity: 1024,
        }
    }
}

impl GrpcConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads the gateway configuration from a TOML or JSON file.
///
/// The format is picked from the file extension.
pub fn load_config(path: &str) -> Result<GatewayConfig> {
    build(config::File::with_name(path))
        .with_context(|| format!("Failed to build configuration from '{path}'"))
}

/// Loads the gateway configuration from an inline JSON document.
pub fn load_config_json(json: &str) -> Result<GatewayConfig> {
    build(config::File::from_str(json, config::FileFormat::Json))
        .context("Failed to build configuration from inline JSON")
}

fn build<S>(source: S) -> Result<GatewayConfig>
where
    S: config::Source + Send + Sync + 'static,
{
    let settings: GatewayConfig = config::Config::builder()
        .add_source(source)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    Ok(settings)
}
