//! Shared `tracing` setup for the chain-cursor binaries.

mod logging;

pub use logging::{init, LogConfig, LogFormat, LogOutput};
