use crate::{cursor::Cursor, error::SyncError, notifier::Notifier};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How the sequencer derives the next cursor after being woken while caught up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum AdvancePolicy {
    /// Assume every wake is exactly one step and return `latest + 1`, where
    /// `latest` was read before waiting.
    #[default]
    Increment,
    /// Re-read the source after every wake and return the fresh value once it
    /// is ahead of the client, waiting again otherwise.
    Requery,
}

/// Computes the next cursor a client should learn about.
///
/// Stateless apart from its notifier: the client's position is passed in on
/// every call, so one sequencer is shared by all connections.
pub struct CursorSequencer {
    notifier: Arc<Notifier>,
    policy: AdvancePolicy,
}

impl CursorSequencer {
    pub fn new(notifier: Arc<Notifier>, policy: AdvancePolicy) -> Self {
        Self { notifier, policy }
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn policy(&self) -> AdvancePolicy {
        self.policy
    }

    /// Returns the next known cursor for a client positioned at `current`.
    ///
    /// When the client is behind (or has no position yet) this returns the
    /// source's latest value right away, possibly far ahead of `current`; the
    /// caller must walk every value in between. When the client is caught up
    /// it blocks on the notifier first.
    pub async fn next(
        &self,
        current: Option<&Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Cursor, SyncError> {
        if self.notifier.is_stopped() {
            return Err(self.notifier.stop_reason());
        }

        let latest = self.latest(cancel).await?;
        match current {
            Some(current) if *current >= latest => {}
            _ => return Ok(latest),
        }

        match self.policy {
            AdvancePolicy::Increment => {
                self.notifier.wait_for_next(cancel).await?;
                Ok(latest.next())
            }
            AdvancePolicy::Requery => loop {
                self.notifier.wait_for_next(cancel).await?;
                let latest = self.latest(cancel).await?;
                if current.is_some_and(|current| *current < latest) {
                    return Ok(latest);
                }
                tracing::trace!(latest = %latest, "Woken without progress, waiting again.");
            },
        }
    }

    async fn latest(&self, cancel: &CancellationToken) -> Result<Cursor, SyncError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            res = self.notifier.source().latest() => res.map_err(SyncError::from),
        }
    }
}
