//! Shared test helpers for creating Retriever instances backed by a scripted page source.

use crate::config::Config;
use crate::credentials::{CredentialShape, Credentials};
use crate::error::FetchError;
use crate::fetcher::{FetchRequest, PageSource};
use crate::retriever::Retriever;
use crate::types::{Event, PageResult, Record};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory portal serving `total` generated rows in pages of `page_size`.
///
/// Every request is recorded so tests can assert exactly which pages were
/// fetched and with which credential shape.
pub(crate) struct ScriptedSource {
    total: u64,
    page_size: usize,
    /// Total reported to clients when it differs from the real row count
    reported_total: Mutex<Option<u64>>,
    rejected_shapes: HashMap<CredentialShape, FetchError>,
    failing_pages: HashMap<u32, FetchError>,
    /// Run requests (not the initial check) for this page panic
    panicking_page: Option<u32>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedSource {
    pub(crate) fn paged(total: u64, page_size: usize) -> Self {
        Self {
            total,
            page_size,
            reported_total: Mutex::new(None),
            rejected_shapes: HashMap::new(),
            failing_pages: HashMap::new(),
            panicking_page: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request made with `shape` fails with `error`
    pub(crate) fn rejecting(mut self, shape: CredentialShape, error: FetchError) -> Self {
        self.rejected_shapes.insert(shape, error);
        self
    }

    /// Requests for `page` fail with `error` (page 1 included, so the probe sees it too)
    pub(crate) fn failing_at(mut self, page: u32, error: FetchError) -> Self {
        self.failing_pages.insert(page, error);
        self
    }

    /// Panic while serving `page` during a run, as a broken source implementation would
    pub(crate) fn panicking_at(mut self, page: u32) -> Self {
        self.panicking_page = Some(page);
        self
    }

    /// Report `total` instead of the real row count (`None` restores the real count)
    pub(crate) fn report_total(&self, total: Option<u64>) {
        *self.reported_total.lock().unwrap() = total;
    }

    /// (page, shape) of every request so far, in order
    pub(crate) fn calls(&self) -> Vec<(u32, CredentialShape)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| (request.page, request.shape))
            .collect()
    }

    /// Page numbers requested after the first `skip` requests
    pub(crate) fn pages_after(&self, skip: usize) -> Vec<u32> {
        self.calls().into_iter().skip(skip).map(|(page, _)| page).collect()
    }

    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn rows_for(&self, page: u32) -> Vec<Record> {
        let first = (u64::from(page) - 1) * self.page_size as u64;
        (first..self.total)
            .take(self.page_size)
            .map(|index| {
                let mut record = Record::new();
                record.insert("page".into(), page.into());
                record.insert("index".into(), index.into());
                record
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, request: &FetchRequest) -> Result<PageResult, FetchError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(error) = self.rejected_shapes.get(&request.shape) {
            return Err(error.clone());
        }
        if request.quiet && self.panicking_page == Some(request.page) {
            panic!("page source crashed on page {}", request.page);
        }
        if let Some(error) = self.failing_pages.get(&request.page) {
            return Err(error.clone());
        }
        let total_count = self.reported_total.lock().unwrap().unwrap_or(self.total);
        Ok(PageResult {
            rows: self.rows_for(request.page),
            total_count,
        })
    }
}

/// Config with no pause between pages
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.retrieval.page_delay = Duration::ZERO;
    config
}

/// Retriever over `source` with no pause between pages
pub(crate) fn create_test_retriever(source: ScriptedSource) -> (Retriever, Arc<ScriptedSource>) {
    create_test_retriever_with(test_config(), source)
}

pub(crate) fn create_test_retriever_with(
    config: Config,
    source: ScriptedSource,
) -> (Retriever, Arc<ScriptedSource>) {
    let source = Arc::new(source);
    let retriever = Retriever::with_source(config, source.clone());
    (retriever, source)
}

pub(crate) fn test_credentials() -> Credentials {
    Credentials {
        session_id: "session-abc".into(),
        imei_ticket: "imei-123".into(),
        source_type_ticket: "ticket-xyz".into(),
    }
}

/// Wait for the next event matching `predicate`, failing the test after 5 seconds
pub(crate) async fn wait_for_event<F>(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    mut predicate: F,
) -> Event
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drain events until the run's `Finished` event, returning everything received
pub(crate) async fn collect_until_finished(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
) -> Vec<Event> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.unwrap();
            let done = matches!(event, Event::Finished { .. });
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("timed out waiting for run to finish")
}
