//! The chain-agnostic cursor streaming engine.
//!
//! This crate turns "the chain advanced" notifications coming from any
//! [`CursorSource`] into a gap-free, resumable sequence of cursors that can be
//! delivered to any number of clients.
//!
//! # Key Components
//!
//! *   [`cursor::Cursor`]: An arbitrary-precision, non-negative position on a chain.
//! *   [`source::CursorSource`]: The narrow interface every chain adapter implements.
//! *   [`notifier::Notifier`]: A closeable broadcast primitive. It owns the single
//!     long-lived subscription to the source and releases every waiter when that
//!     subscription ends.
//! *   [`sequencer::CursorSequencer`]: Decides which cursor a client should learn
//!     about next, blocking only when the client is caught up.
//! *   [`protocol::StreamProtocol`]: The per-connection delivery loop that back-fills
//!     every integer between the client's position and the chain's latest value.
//! *   [`sources`]: The bundled adapters (`memory`, `solana`, `evm`).
pub mod config;
pub mod cursor;
pub mod error;
pub mod notifier;
pub mod protocol;
pub mod sequencer;
pub mod source;
/// Concrete `CursorSource` adapters.
pub mod sources;

pub use cursor::Cursor;
pub use error::{ParseCursorError, SourceError, SyncError};
pub use notifier::{Notifier, NotifierState};
pub use protocol::StreamProtocol;
pub use sequencer::{AdvancePolicy, CursorSequencer};
pub use source::CursorSource;
