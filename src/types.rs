//! Core types for campus-ledger

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialShape;
use crate::error::FetchError;

/// One transaction entry, passed through untouched
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Unique identifier for a retrieval run
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One successfully fetched page
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageResult {
    /// Rows on this page, in server order
    pub rows: Vec<Record>,
    /// Total records the server reports for the whole history (0 if unknown)
    pub total_count: u64,
}

impl PageResult {
    /// Number of rows on this page
    pub fn page_size(&self) -> usize {
        self.rows.len()
    }
}

/// Page range requested by the caller
///
/// `end_page == 0` means "all pages": the end is taken from the computed
/// total page count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRange {
    /// First page to fetch (pages are numbered from 1)
    pub start_page: u32,
    /// Last page to fetch, or 0 for all pages
    pub end_page: u32,
}

impl RetrievalRange {
    /// Every page from the first to the last
    pub const ALL: RetrievalRange = RetrievalRange {
        start_page: 1,
        end_page: 0,
    };

    /// Range from `start_page` to `end_page` inclusive (0 = to the last page)
    pub fn new(start_page: u32, end_page: u32) -> Self {
        Self {
            start_page,
            end_page,
        }
    }

    /// Whether the end page is the "all pages" sentinel
    pub fn is_unbounded(&self) -> bool {
        self.end_page == 0
    }
}

impl Default for RetrievalRange {
    fn default() -> Self {
        Self::ALL
    }
}

/// Lifecycle state of a retrieval run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not started
    Idle,
    /// Fetching pages
    Running,
    /// Every planned page was fetched
    Completed,
    /// A page failed; earlier rows are kept
    Failed,
    /// Stopped on request; earlier rows are kept
    Cancelled,
}

impl RunStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Whether the collected rows are usable (cancellation counts as partial success)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Cancelled)
    }
}

/// Event emitted while probing and retrieving
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Credentials were accepted by the portal
    Probed {
        /// The credential shape that worked
        shape: CredentialShape,
        /// Total records reported by the portal
        total_count: u64,
        /// Rows on the probe page
        page_size: usize,
        /// Planned page count (0 = unknown)
        total_pages: u32,
    },

    /// A retrieval run started
    RunStarted {
        /// Run ID
        run: RunId,
        /// First page to fetch
        start_page: u32,
        /// Planned last page (0 = unknown, fetch until a short page)
        end_page: u32,
    },

    /// A page was fetched
    Progress {
        /// Run ID
        run: RunId,
        /// Page just fetched
        current_page: u32,
        /// Planned last page (0 = unknown)
        total_pages: u32,
    },

    /// Rows of the page just fetched
    Rows {
        /// Run ID
        run: RunId,
        /// Page the rows came from
        page: u32,
        /// The page's records
        records: Vec<Record>,
    },

    /// A retrieval run ended (always the last event of a run)
    Finished {
        /// Run ID
        run: RunId,
        /// Terminal status
        status: RunStatus,
        /// Whether the collected rows are usable
        success: bool,
        /// Human-readable summary
        message: String,
        /// Rows collected over the whole run
        total_rows: usize,
        /// Page that failed, for failed runs
        #[serde(skip_serializing_if = "Option::is_none")]
        failed_page: Option<u32>,
    },
}

/// The page that ended a failed run and why
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageFailure {
    /// Page that could not be fetched
    pub page: u32,
    /// What went wrong
    pub error: FetchError,
}

/// Final outcome of a retrieval run, handed to the caller for export
#[derive(Clone, Debug)]
pub struct RetrievalReport {
    /// Run ID
    pub run: RunId,
    /// Terminal status
    pub status: RunStatus,
    /// Rows from every successfully fetched page, in page order
    pub rows: Vec<Record>,
    /// Pages fetched successfully, in order
    pub pages_fetched: Vec<u32>,
    /// Set when the run failed
    pub failure: Option<PageFailure>,
    /// Human-readable summary (same text as the `Finished` event)
    pub message: String,
}

impl RetrievalReport {
    /// Convert a failed run into an [`Error::PageFailed`](crate::Error::PageFailed)
    pub fn into_result(self) -> crate::Result<Vec<Record>> {
        match self.failure {
            Some(PageFailure { page, error }) => Err(crate::Error::PageFailed {
                page,
                source: error,
            }),
            None => Ok(self.rows),
        }
    }
}
