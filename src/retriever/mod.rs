//! Retrieval orchestration split into focused submodules.
//!
//! The `Retriever` struct and its methods are organized by concern:
//! - [`probe`] - Credential-shape probing and session discovery
//! - [`control`] - Starting and stopping runs
//! - [`run_task`] - The background page loop of a single run

mod control;
mod probe;
mod run_task;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use control::RetrievalHandle;
pub use probe::ProbedSession;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{HttpPageSource, PageSource};
use crate::types::{Event, RunId, RunStatus};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio_util::sync::CancellationToken;

/// The run currently holding the retriever's single run slot
#[derive(Debug, Clone)]
pub(crate) struct ActiveRun {
    pub(crate) id: RunId,
    pub(crate) token: CancellationToken,
}

/// Transaction history retriever (cloneable - all fields are Arc-wrapped)
///
/// Probes credentials, then runs at most one background retrieval at a time.
/// Progress is reported through [`Event`]s; the final rows come back through
/// the [`RetrievalHandle`].
#[derive(Clone)]
pub struct Retriever {
    /// Configuration (wrapped in Arc for sharing with run tasks)
    pub(crate) config: Arc<Config>,
    /// Page source used for every request (trait object so tests can script responses)
    pub(crate) source: Arc<dyn PageSource>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Slot for the run in progress, if any
    pub(crate) active_run: Arc<tokio::sync::Mutex<Option<ActiveRun>>>,
    /// Terminal status of the most recent run (`Idle` before the first one ends)
    pub(crate) last_status: Arc<tokio::sync::Mutex<RunStatus>>,
    /// Next run ID counter
    pub(crate) next_run_id: Arc<AtomicU64>,
}

impl Retriever {
    /// Create a retriever talking to the configured portal over HTTP
    ///
    /// Fails with [`Error::Config`](crate::Error::Config) when the
    /// configuration is unusable.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = HttpPageSource::new(&config.portal)?;
        Ok(Self::with_source(config, Arc::new(source)))
    }

    /// Create a retriever that fetches pages from `source`
    pub fn with_source(config: Config, source: Arc<dyn PageSource>) -> Self {
        let capacity = config.retrieval.event_buffer.max(1);
        let (event_tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self {
            config: Arc::new(config),
            source,
            event_tx,
            active_run: Arc::new(tokio::sync::Mutex::new(None)),
            last_status: Arc::new(tokio::sync::Mutex::new(RunStatus::Idle)),
            next_run_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe to probe and run events
    ///
    /// Events sent before subscribing are not replayed; subscribe before
    /// calling [`probe`](Self::probe) or [`start`](Self::start).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe to events as a [`Stream`](tokio_stream::Stream)
    ///
    /// Lagged receivers yield `Err` items instead of silently skipping.
    pub fn event_stream(&self) -> tokio_stream::wrappers::BroadcastStream<Event> {
        tokio_stream::wrappers::BroadcastStream::new(self.event_tx.subscribe())
    }

    /// The configuration this retriever was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current lifecycle state
    ///
    /// `Running` while a run holds the slot, otherwise the terminal status of
    /// the last run, or `Idle` if none has ended yet.
    pub async fn status(&self) -> RunStatus {
        let active_run = self.active_run.lock().await;
        if active_run.is_some() {
            return RunStatus::Running;
        }
        *self.last_status.lock().await
    }

    /// Free the run slot held by `run` and record how it ended
    pub(crate) async fn release_slot(&self, run: RunId, status: RunStatus) {
        debug_assert!(status.is_terminal());
        let mut active_run = self.active_run.lock().await;
        if active_run.as_ref().is_some_and(|active| active.id == run) {
            *active_run = None;
            *self.last_status.lock().await = status;
        }
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
