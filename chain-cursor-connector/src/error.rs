use thiserror::Error;

/// Raised when a string is not a valid cursor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseCursorError {
    #[error("cursor is empty")]
    Empty,

    #[error("invalid digit '{found}' at index {index}")]
    InvalidDigit { index: usize, found: char },

    #[error("cursor is {len} bytes long, at most {max} are accepted")]
    TooLong { len: usize, max: usize },

    #[error("unsupported radix {0}")]
    UnsupportedRadix(u32),
}

/// Failures reported by a `CursorSource` adapter.
///
/// Adapters wrap their client-specific errors into one of these variants so the
/// engine never depends on a chain SDK.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Unexpected response from node: {0}")]
    InvalidResponse(String),

    #[error("Node returned an invalid cursor: {0}")]
    Cursor(#[from] ParseCursorError),
}

/// Errors produced by the notifier, the sequencer and the delivery loop.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The notifier's subscription has ended; nothing more will be delivered.
    #[error("notifier has been stopped")]
    Stopped,

    /// The notifier stopped because its source subscription failed.
    #[error("cursor source failed: {0}")]
    SourceFailed(String),

    /// `Notifier::run` was called after the notifier stopped. It is not restartable.
    #[error("notifier has already been stopped and cannot be restarted")]
    AlreadyStopped,

    /// `Notifier::run` was called while another call is still subscribed.
    #[error("notifier subscription is already running")]
    AlreadyRunning,

    #[error("operation was cancelled")]
    Cancelled,

    /// The client supplied a start cursor that could not be parsed.
    #[error("invalid start cursor '{value}': {source}")]
    InvalidStart {
        value: String,
        #[source]
        source: ParseCursorError,
    },

    /// Writing to the client failed; only that connection is affected.
    #[error("client transport failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Source(#[from] SourceError),
}
