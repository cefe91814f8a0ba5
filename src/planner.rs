//! Page-count planning from the server's reported record total.

use crate::types::RetrievalRange;

/// Number of pages needed for `total_count` records at `page_size` per page
///
/// Returns 0 when `page_size` is 0: the page count is unknown and the caller
/// has to proceed page by page.
pub fn total_pages(total_count: u64, page_size: usize) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = total_count.div_ceil(page_size as u64);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Effective last page for a requested range
///
/// The "all pages" sentinel (`end_page == 0`) and any end beyond the last
/// page both resolve to the computed page count. The result may be smaller
/// than `range.start_page`; the run then fetches nothing.
pub fn plan(total_count: u64, page_size: usize, range: RetrievalRange) -> u32 {
    let pages = total_pages(total_count, page_size);
    if range.is_unbounded() || range.end_page > pages {
        pages
    } else {
        range.end_page
    }
}

/// Upper bound a run iterates to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PageBound {
    /// Stop after this page
    Through(u32),
    /// Page count unknown; stop at the first short page
    Open,
}

impl PageBound {
    /// Resolve the bound from a known total, degrading to [`PageBound::Open`]
    /// when the page count cannot be computed
    pub(crate) fn resolve(total_count: u64, page_size: usize, range: RetrievalRange) -> Self {
        if total_pages(total_count, page_size) == 0 {
            if range.is_unbounded() {
                PageBound::Open
            } else {
                PageBound::Through(range.end_page)
            }
        } else {
            PageBound::Through(plan(total_count, page_size, range))
        }
    }

    /// Whether `page` lies within the bound
    pub(crate) fn includes(&self, page: u32) -> bool {
        match self {
            PageBound::Through(end) => page <= *end,
            PageBound::Open => true,
        }
    }

    /// Last page for progress reporting (0 = unknown)
    pub(crate) fn last_page(&self) -> u32 {
        match self {
            PageBound::Through(end) => *end,
            PageBound::Open => 0,
        }
    }
}
