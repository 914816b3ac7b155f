#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{cursor::Cursor, sequencer::AdvancePolicy};
use solana_sdk::commitment_config::CommitmentLevel;

/// The top-level configuration for the `chain-cursor-connector` library.
///
/// It selects which chain adapter feeds the engine and carries the settings of
/// every adapter, so one file can be switched between chains by changing `chain`.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct ConnectorConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub chain: ChainKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub solana: Solana,
    #[cfg_attr(feature = "serde", serde(default))]
    pub evm: Evm,
    #[cfg_attr(feature = "serde", serde(default))]
    pub memory: Memory,
    #[cfg_attr(feature = "serde", serde(default))]
    pub sequencer: Sequencer,
}

/// The chain adapter to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ChainKind {
    #[default]
    Solana,
    Evm,
    Memory,
}

/// Connection settings for a Solana cluster. Cursors are slots.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct Solana {
    pub rpc_url: String,
    pub ws_url: String,
    #[cfg_attr(feature = "serde", serde(with = "serde_commitment"))]
    pub commitment: CommitmentLevel,
}

/// Connection settings for an EVM node. Cursors are block numbers.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct Evm {
    /// JSON-RPC endpoint used for `eth_blockNumber`.
    pub http_url: String,
    /// WebSocket endpoint used for `eth_subscribe("newHeads")`.
    pub ws_url: String,
}

/// Settings for the in-process source, used for local demos.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct Memory {
    /// The first cursor the source reports. Written as a decimal string or,
    /// when it fits, a plain integer.
    pub start: Cursor,
    /// If set, the source advances by one every this many milliseconds.
    pub tick_interval_ms: Option<u64>,
}

/// Behavior of the cursor sequencer.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Sequencer {
    #[cfg_attr(feature = "serde", serde(default))]
    pub advance_policy: AdvancePolicy,
}

impl Default for Solana {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            ws_url: "ws://127.0.0.1:8900".to_string(),
            commitment: CommitmentLevel::Finalized,
        }
    }
}

impl Default for Evm {
    fn default() -> Self {
        Self {
            http_url: "http://127.0.0.1:8545".to_string(),
            ws_url: "ws://127.0.0.1:8546".to_string(),
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            start: Cursor::zero(),
            tick_interval_ms: Some(1000),
        }
    }
}

#[cfg(feature = "serde")]
mod serde_commitment {

    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(c: &CommitmentLevel, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = match c {
            CommitmentLevel::Processed => "processed",
            CommitmentLevel::Confirmed => "confirmed",
            CommitmentLevel::Finalized => "finalized",
        };
        serializer.serialize_str(s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<CommitmentLevel, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "processed" => Ok(CommitmentLevel::Processed),
            "confirmed" => Ok(CommitmentLevel::Confirmed),
            "finalized" => Ok(CommitmentLevel::Finalized),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["processed", "confirmed", "finalized"],
            )),
        }
    }
}
