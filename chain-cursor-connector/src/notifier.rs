//! # Notifier
//!
//! A closeable broadcast primitive that lets any number of tasks wait until
//! the [`CursorSource`] may have advanced.
//!
//! The notifier owns the single long-lived subscription to its source. Every
//! advancement bumps a generation counter inside a `watch` channel, which
//! wakes all current waiters at once. When the subscription ends, for any
//! reason, the state flips to [`NotifierState::Stopped`] under the same lock
//! and a final wake is sent. That last wake is what releases tasks that
//! started waiting after the final real advancement.
//!
//! Waiters never register anywhere else: a cancelled waiter simply drops its
//! receiver, so there is nothing to deregister and nothing left parked.

use crate::{cursor::Cursor, error::SyncError, source::CursorSource};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// The lifecycle of a notifier. `Active` until its subscription ends, then
/// `Stopped` forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierState {
    Active,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct Signal {
    generation: u64,
    state: NotifierState,
}

/// Wakes waiting tasks whenever the bound source advances.
pub struct Notifier {
    source: Arc<dyn CursorSource>,
    signal: watch::Sender<Signal>,
    subscribed: AtomicBool,
    failure: OnceLock<String>,
}

impl Notifier {
    /// Creates an active notifier bound to `source`. Nothing is subscribed
    /// until [`Notifier::run`] is called.
    pub fn new(source: Arc<dyn CursorSource>) -> Self {
        let (signal, _) = watch::channel(Signal {
            generation: 0,
            state: NotifierState::Active,
        });
        Self {
            source,
            signal,
            subscribed: AtomicBool::new(false),
            failure: OnceLock::new(),
        }
    }

    pub fn source(&self) -> &Arc<dyn CursorSource> {
        &self.source
    }

    pub fn state(&self) -> NotifierState {
        self.signal.borrow().state
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == NotifierState::Stopped
    }

    /// The error a stopped notifier reports to its waiters:
    /// [`SyncError::SourceFailed`] if the subscription died of a source error,
    /// [`SyncError::Stopped`] otherwise.
    pub fn stop_reason(&self) -> SyncError {
        match self.failure.get() {
            Some(reason) => SyncError::SourceFailed(reason.clone()),
            None => SyncError::Stopped,
        }
    }

    /// Number of tasks currently blocked in [`Notifier::wait_for_next`].
    pub fn waiters(&self) -> usize {
        self.signal.receiver_count()
    }

    /// Pumps the source's advancement events into broadcasts.
    ///
    /// Returns `Ok(())` when `cancel` fires or the source subscription completes,
    /// and the source's error otherwise. Whatever the outcome, the notifier is
    /// stopped and every waiter is woken before this returns. A stopped
    /// notifier cannot be run again.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SyncError> {
        if self.is_stopped() {
            return Err(SyncError::AlreadyStopped);
        }
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return Err(if self.is_stopped() {
                SyncError::AlreadyStopped
            } else {
                SyncError::AlreadyRunning
            });
        }

        let source = self.source.name();
        let _stop = StopOnDrop {
            signal: &self.signal,
            source,
        };

        tracing::info!(source, "Waiting for new cursors...");
        let on_advance = |cursor: Cursor| {
            tracing::debug!(source, cursor = %cursor, "Received new cursor");
            self.broadcast();
        };

        tokio::select! {
            biased;
            res = self.source.subscribe(cancel.clone(), &on_advance) => match res {
                Ok(()) => {
                    tracing::info!(source, "Source subscription completed.");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(source, error = %e, "Source subscription failed.");
                    let _ = self.failure.set(e.to_string());
                    Err(SyncError::Source(e))
                }
            },
            _ = cancel.cancelled() => {
                tracing::info!(source, "Notifier cancelled.");
                Ok(())
            }
        }
    }

    /// Blocks until the next broadcast.
    ///
    /// Returns the [`Notifier::stop_reason`] immediately if the notifier is
    /// already stopped, or when the wake that releases this call is the stop
    /// transition itself. Returns `Err(Cancelled)` if `cancel` fires first. A
    /// stop that races with `cancel` is reported as the stop.
    pub async fn wait_for_next(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        // Subscribing marks the current generation as seen, so any broadcast
        // after this line wakes us even if it lands before the select below.
        let mut rx = self.signal.subscribe();
        if rx.borrow_and_update().state == NotifierState::Stopped {
            return Err(self.stop_reason());
        }

        tokio::select! {
            biased;
            changed = rx.changed() => match changed {
                Ok(()) if rx.borrow().state == NotifierState::Active => Ok(()),
                _ => Err(self.stop_reason()),
            },
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
        }
    }

    fn broadcast(&self) {
        self.signal.send_if_modified(|signal| {
            if signal.state == NotifierState::Stopped {
                return false;
            }
            signal.generation = signal.generation.wrapping_add(1);
            true
        });
    }
}

/// Performs the stop transition when `run` returns, errors, panics, or its
/// future is dropped.
struct StopOnDrop<'a> {
    signal: &'a watch::Sender<Signal>,
    source: &'a str,
}

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.signal.send_modify(|signal| {
            signal.state = NotifierState::Stopped;
            signal.generation = signal.generation.wrapping_add(1);
        });
        tracing::info!(source = self.source, "Notifier stopped, all waiters released.");
    }
}
