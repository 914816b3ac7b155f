use crate::{
    proto::{chain_cursor_client::ChainCursorClient, StartCursor},
    storage::CursorStore,
};
use anyhow::{Context, Result};
use chain_cursor_connector::Cursor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::Code;

/// Follows a gateway's cursor stream and records progress in a [`CursorStore`].
///
/// On start the consumer resumes right after the last committed cursor, or at
/// the chain's latest cursor when nothing was committed yet.
pub struct Consumer {
    endpoint: String,
    store: Arc<dyn CursorStore>,
    echo: bool,
}

impl Consumer {
    pub fn new(endpoint: impl Into<String>, store: Arc<dyn CursorStore>) -> Self {
        Self {
            endpoint: endpoint.into(),
            store,
            echo: false,
        }
    }

    /// Also print every received cursor to stdout.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn store(&self) -> &Arc<dyn CursorStore> {
        &self.store
    }

    /// Consumes the stream until `cancel` fires, the gateway shuts down, or the
    /// stream fails. Returns the number of cursors committed.
    pub async fn run(&self, cancel: CancellationToken) -> Result<u64> {
        let start = self.store.last_cursor().await?.map(|last| last.next());
        match &start {
            Some(start) => tracing::info!(cursor = %start, "Resuming cursor stream"),
            None => tracing::info!("No stored cursor, starting at the chain's latest"),
        }

        let mut client = ChainCursorClient::connect(self.endpoint.clone())
            .await
            .with_context(|| format!("Failed to connect to '{}'", self.endpoint))?;
        let request = StartCursor {
            value: start.as_ref().map(Cursor::to_string),
        };

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(0),
            response = client.cursors(request) => response.context("Cursors call was rejected")?.into_inner(),
        };

        let mut committed = 0;
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Consumer cancelled.");
                    break;
                }
                message = stream.message() => message,
            };

            match message {
                Ok(Some(message)) => {
                    let cursor: Cursor = message
                        .value
                        .parse()
                        .with_context(|| format!("Gateway sent an invalid cursor '{}'", message.value))?;
                    if self.echo {
                        println!("{cursor}");
                    }
                    if self.store.commit(&cursor).await? {
                        committed += 1;
                    }
                    tracing::debug!(cursor = %cursor, "Committed cursor");
                }
                Ok(None) => {
                    tracing::info!("Cursor stream ended.");
                    break;
                }
                Err(status) if status.code() == Code::Cancelled => {
                    tracing::info!(reason = status.message(), "Gateway is shutting down.");
                    break;
                }
                Err(status) => return Err(status).context("Cursor stream failed"),
            }
        }

        Ok(committed)
    }
}
