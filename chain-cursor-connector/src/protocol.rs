//! # Cursor Delivery Protocol
//!
//! The per-connection loop behind the `Cursors` streaming call. It repeatedly
//! asks the [`CursorSequencer`] for the next known cursor and then sends every
//! integer from the connection's position up to that cursor, one item each.
//!
//! Delivery guarantees for a single connection:
//! - without a start cursor, the first item is the source's latest value;
//! - every later item is exactly one greater than the previous one;
//! - nothing is skipped, however far the source jumps between polls.

use crate::{
    cursor::Cursor,
    error::{ParseCursorError, SyncError},
    sequencer::CursorSequencer,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Longest start cursor a client may send, in bytes. Leading zeros count.
/// A 256-bit height needs 78 digits.
pub const MAX_START_LEN: usize = 128;

/// One item on a connection's output channel. A terminal error, if any, is
/// the last item written.
pub type Delivery = Result<Cursor, SyncError>;

/// Drives cursor delivery for client connections.
#[derive(Clone)]
pub struct StreamProtocol {
    sequencer: Arc<CursorSequencer>,
}

impl StreamProtocol {
    pub fn new(sequencer: Arc<CursorSequencer>) -> Self {
        Self { sequencer }
    }

    pub fn sequencer(&self) -> &Arc<CursorSequencer> {
        &self.sequencer
    }

    /// Parses the optional decimal start cursor sent by a client.
    ///
    /// Values longer than [`MAX_START_LEN`] bytes are rejected before any
    /// digit is read.
    pub fn parse_start(value: Option<&str>) -> Result<Option<Cursor>, SyncError> {
        value
            .map(|value| {
                if value.len() > MAX_START_LEN {
                    return Err(SyncError::InvalidStart {
                        value: format!("{}...", value.chars().take(16).collect::<String>()),
                        source: ParseCursorError::TooLong {
                            len: value.len(),
                            max: MAX_START_LEN,
                        },
                    });
                }
                value.parse().map_err(|source| SyncError::InvalidStart {
                    value: value.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Streams cursors into `tx` until cancelled or until an error occurs.
    ///
    /// Cancellation is a clean end of stream and returns `Ok(())`. A closed
    /// channel returns [`SyncError::Transport`]. Sequencer errors (a stopped
    /// notifier, a failing source) are returned as they are. Nothing is
    /// written to `tx` for the error; the caller decides how to report it.
    pub async fn deliver(
        &self,
        start: Option<Cursor>,
        tx: &mpsc::Sender<Delivery>,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        // The next cursor to send. `None` until the first catch-up.
        let mut cur = start;

        loop {
            // The sequencer is asked about the last cursor this connection has
            // seen, so an advancement that lands while sending is not waited on.
            let seen = cur.as_ref().and_then(Cursor::prev);
            let next = tokio::select! {
                biased;
                _ = tx.closed() => return Err(client_gone()),
                next = self.sequencer.next(seen.as_ref(), cancel) => next,
            };
            let value = match next {
                Ok(value) => value,
                Err(SyncError::Cancelled) => return Ok(()),
                Err(e) => return Err(e),
            };

            // First catch-up: begin exactly at the source's latest value.
            let mut pos = cur.take().unwrap_or_else(|| value.clone());
            while pos <= value {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    sent = tx.send(Ok(pos.clone())) => sent.map_err(|_| client_gone())?,
                }
                tracing::trace!(cursor = %pos, "Delivered cursor");
                pos.increment();
            }
            cur = Some(pos);
        }
    }
}

fn client_gone() -> SyncError {
    SyncError::Transport("client disconnected".to_string())
}
