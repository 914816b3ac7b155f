mod evm;
mod memory;
mod solana;

pub use evm::EvmBlockSource;
pub use memory::MemorySource;
pub use solana::SolanaSlotSource;

use crate::{
    config::{ChainKind, ConnectorConfig},
    source::CursorSource,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Builds the adapter selected by `config.chain`.
///
/// The memory source starts its ticker on the current runtime when a tick
/// interval is configured; the ticker stops when `cancel` fires.
pub fn from_config(config: &ConnectorConfig, cancel: &CancellationToken) -> Arc<dyn CursorSource> {
    match config.chain {
        ChainKind::Solana => Arc::new(SolanaSlotSource::from_config(&config.solana)),
        ChainKind::Evm => Arc::new(EvmBlockSource::from_config(&config.evm)),
        ChainKind::Memory => {
            let source = MemorySource::new(config.memory.start.clone());
            if let Some(ms) = config.memory.tick_interval_ms {
                tokio::spawn(
                    source
                        .clone()
                        .tick(Duration::from_millis(ms.max(1)), cancel.child_token()),
                );
            }
            Arc::new(source)
        }
    }
}
