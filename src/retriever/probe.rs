//! Credential probing: find the cookie shape the portal accepts.

use crate::cookies::CookieJar;
use crate::credentials::{CredentialShape, Credentials};
use crate::error::{Error, Result};
use crate::fetcher::FetchRequest;
use crate::planner;
use crate::types::{Event, PageResult};

use super::Retriever;

/// Outcome of a successful probe, required to start a run
#[derive(Clone, Debug)]
pub struct ProbedSession {
    pub(crate) credentials: Credentials,
    pub(crate) shape: CredentialShape,
    pub(crate) subject_id: String,
    pub(crate) source_type: Option<String>,
    pub(crate) first_page: PageResult,
    pub(crate) total_pages: u32,
}

impl ProbedSession {
    /// Credential shape the portal accepted
    pub fn shape(&self) -> CredentialShape {
        self.shape
    }

    /// Card account being queried
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Total records reported by the portal
    pub fn total_count(&self) -> u64 {
        self.first_page.total_count
    }

    /// Rows on the first page; used as the page size for planning
    pub fn page_size(&self) -> usize {
        self.first_page.page_size()
    }

    /// Planned page count (0 = unknown)
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Page 1 as returned during the probe
    pub fn first_page(&self) -> &PageResult {
        &self.first_page
    }

    pub(crate) fn request(&self, page: u32) -> FetchRequest {
        FetchRequest {
            credentials: self.credentials.clone(),
            shape: self.shape,
            page,
            subject_id: self.subject_id.clone(),
            source_type: self.source_type.clone(),
            quiet: true,
        }
    }
}

impl Retriever {
    /// Probe the portal with each credential shape in turn
    ///
    /// Page 1 is requested with [`CredentialShape::PROBE_ORDER`]; the first
    /// shape that yields a valid page wins and an [`Event::Probed`] is sent.
    /// When every shape fails the error lists each shape's failure.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingSubject`] for an empty subject, before any request
    /// - [`Error::ProbeFailed`] when no shape works
    pub async fn probe(&self, credentials: &Credentials, subject_id: &str) -> Result<ProbedSession> {
        let subject_id = subject_id.trim();
        if subject_id.is_empty() {
            return Err(Error::MissingSubject);
        }

        let source_type = self
            .config
            .credentials
            .send_source_type
            .then(|| credentials.source_type_ticket.clone());

        let mut attempts = Vec::with_capacity(CredentialShape::PROBE_ORDER.len());
        for shape in CredentialShape::PROBE_ORDER {
            let request = FetchRequest {
                credentials: credentials.clone(),
                shape,
                page: 1,
                subject_id: subject_id.to_string(),
                source_type: source_type.clone(),
                quiet: false,
            };

            match self.source.fetch_page(&request).await {
                Ok(first_page) => {
                    let total_pages =
                        planner::total_pages(first_page.total_count, first_page.page_size());
                    tracing::info!(
                        shape = %shape,
                        total = first_page.total_count,
                        page_size = first_page.page_size(),
                        total_pages,
                        "credentials accepted"
                    );
                    self.emit_event(Event::Probed {
                        shape,
                        total_count: first_page.total_count,
                        page_size: first_page.page_size(),
                        total_pages,
                    });
                    return Ok(ProbedSession {
                        credentials: credentials.clone(),
                        shape,
                        subject_id: subject_id.to_string(),
                        source_type,
                        first_page,
                        total_pages,
                    });
                }
                Err(e) => {
                    tracing::warn!(shape = %shape, error = %e, "credential shape rejected, trying next");
                    attempts.push((shape, e));
                }
            }
        }

        tracing::error!(attempts = attempts.len(), "every credential shape was rejected");
        Err(Error::ProbeFailed { attempts })
    }

    /// Resolve credentials from a cookie snapshot, then [`probe`](Self::probe)
    pub async fn probe_jar(&self, jar: &CookieJar, subject_id: &str) -> Result<ProbedSession> {
        let credentials = Credentials::resolve(jar, &self.config.credentials)?;
        self.probe(&credentials, subject_id).await
    }
}
