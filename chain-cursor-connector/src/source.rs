use crate::{cursor::Cursor, error::SourceError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Callback invoked by a source every time the chain advances.
pub type OnAdvance<'a> = dyn Fn(Cursor) + Send + Sync + 'a;

/// A chain-specific supplier of cursor advancement.
///
/// Every adapter (Solana slots, EVM block heights, an in-memory source for
/// tests) implements this trait, and the engine only ever talks to it through
/// an `Arc<dyn CursorSource>`.
#[async_trait]
pub trait CursorSource: Send + Sync {
    /// A short, human-readable name used in logs.
    fn name(&self) -> &str;

    /// Returns the latest cursor currently known to the chain.
    ///
    /// May perform network I/O and must be safe to call concurrently.
    async fn latest(&self) -> Result<Cursor, SourceError>;

    /// Runs the live subscription until `cancel` fires or the upstream ends.
    ///
    /// `on_advance` is called at least once per advancement. The engine only
    /// cares that the call happens; the value passed is informational.
    /// Returns `Ok(())` on cancellation or normal completion.
    async fn subscribe(
        &self,
        cancel: CancellationToken,
        on_advance: &OnAdvance<'_>,
    ) -> Result<(), SourceError>;
}
