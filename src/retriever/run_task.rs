//! Background task executing one retrieval run.

use crate::planner::{self, PageBound};
use crate::retriever::Retriever;
use crate::retriever::probe::ProbedSession;
use crate::types::{Event, PageFailure, Record, RetrievalRange, RetrievalReport, RunId, RunStatus};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Everything a run task owns, reducing parameter passing between helpers.
pub(crate) struct RunContext {
    pub(crate) retriever: Retriever,
    pub(crate) run: RunId,
    pub(crate) session: ProbedSession,
    pub(crate) range: RetrievalRange,
    pub(crate) bound: PageBound,
    /// The page count is unknown; stop at the first short page
    pub(crate) degraded: bool,
    pub(crate) token: CancellationToken,
}

/// Per-run state accumulated while the loop runs
#[derive(Default)]
struct RetrievalSession {
    rows: Vec<Record>,
    pages: Vec<u32>,
}

/// Run the page loop to completion and report the outcome
///
/// Always clears the retriever's run slot and emits exactly one
/// [`Event::Finished`] before returning.
pub(crate) async fn run_retrieval(mut ctx: RunContext) -> RetrievalReport {
    let mut collected = RetrievalSession::default();
    let (status, failure) = fetch_pages(&mut ctx, &mut collected).await;
    finish(ctx, collected, status, failure).await
}

/// Wait for a spawned run task, ending the run on its behalf if it dies
///
/// A page source that panics takes the run task down before [`finish`]
/// runs. The slot is released here instead and a failed `Finished` event
/// is emitted, so the retriever accepts new runs afterwards.
pub(crate) async fn supervise(
    retriever: Retriever,
    run: RunId,
    task: JoinHandle<RetrievalReport>,
) -> RetrievalReport {
    match task.await {
        Ok(report) => report,
        Err(e) => abort_run(retriever, run, e).await,
    }
}

async fn abort_run(retriever: Retriever, run: RunId, error: JoinError) -> RetrievalReport {
    let message = format!("run task aborted: {error}");

    retriever.release_slot(run, RunStatus::Failed).await;

    tracing::error!(run_id = run.get(), error = %error, "retrieval task died");

    retriever.emit_event(Event::Finished {
        run,
        status: RunStatus::Failed,
        success: false,
        message: message.clone(),
        total_rows: 0,
        failed_page: None,
    });

    RetrievalReport {
        run,
        status: RunStatus::Failed,
        rows: Vec::new(),
        pages_fetched: Vec::new(),
        failure: None,
        message,
    }
}

async fn fetch_pages(
    ctx: &mut RunContext,
    collected: &mut RetrievalSession,
) -> (RunStatus, Option<PageFailure>) {
    let page_delay = ctx.retriever.config.retrieval.page_delay;
    let expected_page_size = match ctx.session.page_size() {
        0 => ctx.retriever.config.retrieval.fallback_page_size,
        size => size,
    };

    let mut page = ctx.range.start_page;
    while ctx.bound.includes(page) {
        if ctx.token.is_cancelled() {
            tracing::info!(run_id = ctx.run.get(), page, "run cancelled");
            return (RunStatus::Cancelled, None);
        }

        let result = match ctx.retriever.source.fetch_page(&ctx.session.request(page)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(run_id = ctx.run.get(), page, error = %e, "page failed, ending run");
                return (RunStatus::Failed, Some(PageFailure { page, error: e }));
            }
        };

        // The total may have moved since the probe
        if page == ctx.range.start_page && result.total_count > 0 {
            let page_size = match ctx.session.page_size() {
                0 => result.page_size(),
                size => size,
            };
            let bound = PageBound::resolve(result.total_count, page_size, ctx.range);
            if bound != ctx.bound {
                tracing::debug!(
                    run_id = ctx.run.get(),
                    from = ctx.bound.last_page(),
                    to = bound.last_page(),
                    total = result.total_count,
                    "replanned from first page"
                );
            }
            ctx.bound = bound;
            ctx.degraded = planner::total_pages(result.total_count, page_size) == 0;
        }

        let row_count = result.rows.len();
        collected.pages.push(page);
        tracing::debug!(
            run_id = ctx.run.get(),
            page,
            rows = row_count,
            end_page = ctx.bound.last_page(),
            "page fetched"
        );

        ctx.retriever.emit_event(Event::Progress {
            run: ctx.run,
            current_page: page,
            total_pages: ctx.bound.last_page(),
        });
        ctx.retriever.emit_event(Event::Rows {
            run: ctx.run,
            page,
            records: result.rows.clone(),
        });
        collected.rows.extend(result.rows);

        if ctx.degraded && row_count < expected_page_size {
            tracing::debug!(run_id = ctx.run.get(), page, rows = row_count, "short page, no more data");
            break;
        }

        let Some(next) = page.checked_add(1) else {
            break;
        };
        if ctx.bound.includes(next) && !page_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(page_delay) => {}
                _ = ctx.token.cancelled() => {}
            }
        }
        page = next;
    }

    (RunStatus::Completed, None)
}

async fn finish(
    ctx: RunContext,
    collected: RetrievalSession,
    status: RunStatus,
    failure: Option<PageFailure>,
) -> RetrievalReport {
    let total_rows = collected.rows.len();
    let message = match (&status, &failure) {
        (RunStatus::Failed, Some(failure)) => format!(
            "page {} failed: {}; {} records kept",
            failure.page, failure.error, total_rows
        ),
        (RunStatus::Cancelled, _) => match collected.pages.last() {
            Some(last) => format!("stopped after page {last}, {total_rows} records kept"),
            None => "stopped before the first page".to_string(),
        },
        _ => format!(
            "retrieved {} records from {} pages",
            total_rows,
            collected.pages.len()
        ),
    };

    // Free the slot before announcing the end so listeners can start a new run
    ctx.retriever.release_slot(ctx.run, status).await;

    match status {
        RunStatus::Failed => {
            tracing::warn!(run_id = ctx.run.get(), rows = total_rows, summary = %message, "retrieval run failed")
        }
        _ => tracing::info!(run_id = ctx.run.get(), rows = total_rows, ?status, "retrieval run finished"),
    }

    ctx.retriever.emit_event(Event::Finished {
        run: ctx.run,
        status,
        success: status.is_success(),
        message: message.clone(),
        total_rows,
        failed_page: failure.as_ref().map(|failure| failure.page),
    });

    RetrievalReport {
        run: ctx.run,
        status,
        rows: collected.rows,
        pages_fetched: collected.pages,
        failure,
        message,
    }
}
