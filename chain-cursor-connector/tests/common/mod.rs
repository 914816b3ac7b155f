#![allow(dead_code)]

use async_trait::async_trait;
use chain_cursor_connector::{
    source::OnAdvance, sources::MemorySource, AdvancePolicy, Cursor, CursorSequencer,
    CursorSource, Notifier, SourceError, StreamProtocol, SyncError,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Upper bound for anything that is expected to happen "promptly".
pub const PROMPTLY: Duration = Duration::from_secs(2);

/// A notifier running over a memory source, with handles to drive both.
pub struct Harness {
    pub source: MemorySource,
    pub notifier: Arc<Notifier>,
    pub shutdown: CancellationToken,
    pub run: JoinHandle<Result<(), SyncError>>,
}

impl Harness {
    /// Starts `Notifier::run` and waits until its subscription is attached.
    pub async fn start(latest: u64) -> Self {
        let source = MemorySource::new(latest);
        let notifier = Arc::new(Notifier::new(Arc::new(source.clone())));
        let shutdown = CancellationToken::new();

        let run = tokio::spawn({
            let notifier = notifier.clone();
            let shutdown = shutdown.clone();
            async move { notifier.run(shutdown).await }
        });

        let watched = source.clone();
        wait_until(move || watched.subscribers() == 1).await;

        Self {
            source,
            notifier,
            shutdown,
            run,
        }
    }

    pub fn sequencer(&self, policy: AdvancePolicy) -> Arc<CursorSequencer> {
        Arc::new(CursorSequencer::new(self.notifier.clone(), policy))
    }

    pub fn protocol(&self) -> StreamProtocol {
        StreamProtocol::new(self.sequencer(AdvancePolicy::Increment))
    }

    /// Waits until `n` tasks are blocked on the notifier.
    pub async fn wait_for_waiters(&self, n: usize) {
        let notifier = self.notifier.clone();
        wait_until(move || notifier.waiters() == n).await;
    }

    /// Cancels the subscription and returns what `run` returned.
    pub async fn stop(self) -> Result<(), SyncError> {
        self.shutdown.cancel();
        tokio::time::timeout(PROMPTLY, self.run)
            .await
            .expect("notifier did not stop in time")
            .expect("notifier task panicked")
    }
}

/// Polls `condition` until it holds, panicking after `PROMPTLY`.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(PROMPTLY, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// A source whose subscription can fire while `latest` stays put, the way a
/// node re-announces a head after a reorg.
#[derive(Clone)]
pub struct StutteringSource {
    latest: Arc<AtomicU64>,
    wakes: broadcast::Sender<()>,
}

impl StutteringSource {
    pub fn new(latest: u64) -> Self {
        let (wakes, _) = broadcast::channel(16);
        Self {
            latest: Arc::new(AtomicU64::new(latest)),
            wakes,
        }
    }

    pub fn subscribers(&self) -> usize {
        self.wakes.receiver_count()
    }

    pub fn set_latest(&self, latest: u64) {
        self.latest.store(latest, Ordering::SeqCst);
    }

    /// Fires the subscription without touching `latest`.
    pub fn wake(&self) {
        let _ = self.wakes.send(());
    }

    fn current(&self) -> Cursor {
        Cursor::from(self.latest.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl CursorSource for StutteringSource {
    fn name(&self) -> &str {
        "stuttering"
    }

    async fn latest(&self) -> Result<Cursor, SourceError> {
        Ok(self.current())
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
        on_advance: &OnAdvance<'_>,
    ) -> Result<(), SourceError> {
        let mut wakes = self.wakes.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                wake = wakes.recv() => match wake {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => on_advance(self.current()),
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
            }
        }
    }
}

/// Runs a notifier over `source` until `shutdown` fires.
pub fn spawn_notifier(
    source: Arc<dyn CursorSource>,
    shutdown: &CancellationToken,
) -> (Arc<Notifier>, JoinHandle<Result<(), SyncError>>) {
    let notifier = Arc::new(Notifier::new(source));
    let run = tokio::spawn({
        let notifier = notifier.clone();
        let shutdown = shutdown.clone();
        async move { notifier.run(shutdown).await }
    });
    (notifier, run)
}
