//! Run control: start, stop and join retrieval runs.

use crate::error::{Error, Result};
use crate::planner::PageBound;
use crate::types::{Event, RetrievalRange, RetrievalReport, RunId};
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

use super::probe::ProbedSession;
use super::run_task::{RunContext, run_retrieval, supervise};
use super::{ActiveRun, Retriever};

/// Handle to a running retrieval
///
/// Dropping the handle does not stop the run; call [`cancel`](Self::cancel)
/// or [`Retriever::stop`].
#[derive(Debug)]
pub struct RetrievalHandle {
    id: RunId,
    token: CancellationToken,
    join: tokio::task::JoinHandle<RetrievalReport>,
}

impl RetrievalHandle {
    /// ID of this run
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Request the run to stop at the next page boundary
    ///
    /// A request already in flight is allowed to finish; its rows are kept.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the run task has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end and return its report
    pub async fn join(self) -> Result<RetrievalReport> {
        self.join
            .await
            .map_err(|e| Error::Other(format!("retrieval task for run {} died: {}", self.id, e)))
    }
}

impl Retriever {
    /// Start retrieving pages for a probed session in the background
    ///
    /// The page range is clamped against the total the portal reported
    /// during the probe (an `end_page` of 0 means all pages). Progress is
    /// reported through events; the collected rows come back through
    /// [`RetrievalHandle::join`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRange`] when `range.start_page` is 0
    /// - [`Error::AlreadyRunning`] while another run is in progress
    pub async fn start(&self, session: &ProbedSession, range: RetrievalRange) -> Result<RetrievalHandle> {
        if range.start_page == 0 {
            return Err(Error::InvalidRange {
                start_page: range.start_page,
                end_page: range.end_page,
            });
        }

        let mut active_run = self.active_run.lock().await;
        if let Some(active) = active_run.as_ref() {
            return Err(Error::AlreadyRunning {
                run: active.id.get(),
            });
        }

        let run = RunId(self.next_run_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();

        let bound = PageBound::resolve(session.total_count(), session.page_size(), range);
        let degraded = session.total_pages() == 0;
        if degraded {
            tracing::warn!(
                run_id = run.get(),
                total = session.total_count(),
                page_size = session.page_size(),
                "page count unknown, fetching until a short page"
            );
        }

        tracing::info!(
            run_id = run.get(),
            start_page = range.start_page,
            end_page = bound.last_page(),
            shape = %session.shape(),
            "retrieval run started"
        );
        self.emit_event(Event::RunStarted {
            run,
            start_page: range.start_page,
            end_page: bound.last_page(),
        });

        let context = RunContext {
            retriever: self.clone(),
            run,
            session: session.clone(),
            range,
            bound,
            degraded,
            token: token.clone(),
        };
        let task = tokio::spawn(run_retrieval(context));
        let join = tokio::spawn(supervise(self.clone(), run, task));

        *active_run = Some(ActiveRun {
            id: run,
            token: token.clone(),
        });
        drop(active_run);

        Ok(RetrievalHandle { id: run, token, join })
    }

    /// Ask the active run, if any, to stop at the next page boundary
    ///
    /// Returns `false` when no run is in progress. The run still ends with a
    /// `Finished` event carrying the rows collected so far.
    pub async fn stop(&self) -> bool {
        let active_run = self.active_run.lock().await;
        match active_run.as_ref() {
            Some(active) => {
                tracing::info!(run_id = active.id.get(), "stop requested");
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a run is in progress
    pub async fn is_running(&self) -> bool {
        self.active_run.lock().await.is_some()
    }
}
