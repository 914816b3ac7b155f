//! Solana slots as a cursor source.
//!
//! The websocket `slotSubscribe` feed fires for every processed slot, which is
//! far more often than the slot moves at the configured commitment. Each
//! notification is therefore only used as a hint: the adapter re-reads the
//! slot at its commitment and reports an advancement only when it went up.

use crate::{
    config,
    cursor::Cursor,
    error::SourceError,
    source::{CursorSource, OnAdvance},
};
use async_trait::async_trait;
use futures::StreamExt;
use solana_client::{
    client_error::ClientError,
    nonblocking::{
        pubsub_client::{PubsubClient, PubsubClientError},
        rpc_client::RpcClient,
    },
};
use solana_sdk::commitment_config::CommitmentConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

impl From<ClientError> for SourceError {
    fn from(err: ClientError) -> Self {
        SourceError::Rpc(err.to_string())
    }
}

impl From<PubsubClientError> for SourceError {
    fn from(err: PubsubClientError) -> Self {
        SourceError::Subscription(err.to_string())
    }
}

/// Reports Solana slots at a fixed commitment level.
pub struct SolanaSlotSource {
    rpc_client: Arc<RpcClient>,
    ws_url: String,
    commitment: CommitmentConfig,
}

impl SolanaSlotSource {
    pub fn new(rpc_client: Arc<RpcClient>, ws_url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        Self {
            rpc_client,
            ws_url: ws_url.into(),
            commitment,
        }
    }

    pub fn from_config(config: &config::Solana) -> Self {
        let commitment = CommitmentConfig {
            commitment: config.commitment,
        };
        let rpc_client = Arc::new(RpcClient::new_with_commitment(config.rpc_url.clone(), commitment));
        Self::new(rpc_client, config.ws_url.clone(), commitment)
    }

    async fn current_slot(&self) -> Result<u64, SourceError> {
        Ok(self.rpc_client.get_slot_with_commitment(self.commitment).await?)
    }
}

#[async_trait]
impl CursorSource for SolanaSlotSource {
    fn name(&self) -> &str {
        "solana-slot"
    }

    async fn latest(&self) -> Result<Cursor, SourceError> {
        self.current_slot().await.map(Cursor::from)
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
        on_advance: &OnAdvance<'_>,
    ) -> Result<(), SourceError> {
        let client = PubsubClient::new(&self.ws_url).await?;
        let (mut slots, unsubscribe) = client.slot_subscribe().await?;
        tracing::info!(ws_url = %self.ws_url, commitment = ?self.commitment.commitment, "Subscribed to slot updates.");

        let mut last_slot: Option<u64> = None;
        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                update = slots.next() => {
                    let Some(update) = update else {
                        tracing::info!("Slot subscription closed by the node.");
                        break Ok(());
                    };
                    tracing::trace!(processed_slot = update.slot, "Slot notification");

                    let slot = match self.current_slot().await {
                        Ok(slot) => slot,
                        Err(e) => break Err(e),
                    };
                    if last_slot.map_or(true, |last| last < slot) {
                        tracing::debug!(slot, "New slot at commitment");
                        on_advance(Cursor::from(slot));
                    }
                    last_slot = Some(slot);
                }
            }
        };

        unsubscribe().await;
        drop(slots);
        if let Err(e) = client.shutdown().await {
            tracing::warn!(error = %e, "Failed to shut down the pubsub client cleanly.");
        }
        result
    }
}
