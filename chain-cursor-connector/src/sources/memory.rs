//! An in-process `CursorSource` driven by explicit calls.
//!
//! Useful for tests and for running the gateway without a node. Every call to
//! [`MemorySource::advance`] or [`MemorySource::advance_to`] is seen by all
//! running subscriptions, and [`MemorySource::complete`] / [`MemorySource::fail`]
//! end them the way a real upstream would.

use crate::{
    cursor::Cursor,
    error::SourceError,
    source::{CursorSource, OnAdvance},
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Upstream {
    Open,
    Completed,
    Failed(String),
}

#[derive(Debug)]
struct State {
    latest: Cursor,
    upstream: Upstream,
}

impl State {
    /// The result a subscription should return, if the upstream has ended.
    fn finished(&self) -> Option<Result<(), SourceError>> {
        match &self.upstream {
            Upstream::Open => None,
            Upstream::Completed => Some(Ok(())),
            Upstream::Failed(message) => Some(Err(SourceError::Subscription(message.clone()))),
        }
    }
}

/// A cursor source whose chain lives in memory.
#[derive(Clone)]
pub struct MemorySource {
    name: String,
    state: Arc<watch::Sender<State>>,
}

impl MemorySource {
    pub fn new(start: impl Into<Cursor>) -> Self {
        let (state, _) = watch::channel(State {
            latest: start.into(),
            upstream: Upstream::Open,
        });
        Self {
            name: "memory".to_string(),
            state: Arc::new(state),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn current(&self) -> Cursor {
        self.state.borrow().latest.clone()
    }

    /// Number of live subscriptions currently attached.
    pub fn subscribers(&self) -> usize {
        self.state.receiver_count()
    }

    /// Advances the chain by one and returns the new latest cursor.
    pub fn advance(&self) -> Cursor {
        let mut latest = Cursor::zero();
        self.state.send_modify(|state| {
            state.latest.increment();
            latest = state.latest.clone();
        });
        latest
    }

    /// Jumps the chain forward to `cursor` with a single notification.
    /// Targets at or behind the current value are ignored.
    pub fn advance_to(&self, cursor: impl Into<Cursor>) {
        let cursor = cursor.into();
        self.state.send_if_modified(|state| {
            if cursor <= state.latest {
                return false;
            }
            state.latest = cursor;
            true
        });
    }

    /// Ends every subscription normally.
    pub fn complete(&self) {
        self.state.send_modify(|state| state.upstream = Upstream::Completed);
    }

    /// Ends every subscription with an error. `latest` fails from now on too.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.state
            .send_modify(|state| state.upstream = Upstream::Failed(message));
    }

    /// Advances the chain once per `period` until `cancel` fires.
    pub async fn tick(self, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let latest = self.advance();
                    tracing::debug!(source = %self.name, cursor = %latest, "Memory source ticked");
                }
            }
        }
    }
}

#[async_trait]
impl CursorSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn latest(&self) -> Result<Cursor, SourceError> {
        let state = self.state.borrow();
        match &state.upstream {
            Upstream::Failed(message) => Err(SourceError::Rpc(message.clone())),
            _ => Ok(state.latest.clone()),
        }
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
        on_advance: &OnAdvance<'_>,
    ) -> Result<(), SourceError> {
        let mut rx = self.state.subscribe();
        if let Some(result) = rx.borrow_and_update().finished() {
            return result;
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }

            let latest = {
                let state = rx.borrow_and_update();
                if let Some(result) = state.finished() {
                    return result;
                }
                state.latest.clone()
            };
            on_advance(latest);
        }
    }
}
