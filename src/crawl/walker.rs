//! Pagination walking: page URL construction and termination tracking.
//!
//! Catalog platforms paginate with a query parameter, but disagree on its
//! name. The walker reuses whichever known parameter the start URL already
//! carries and falls back to appending `page=N`.

use url::Url;

/// Query parameter names recognized as pagination controls.
const PAGINATION_PARAMS: &[&str] = &["page", "p", "offset", "start", "pager"];

/// Consecutive permanent catalog failures tolerated before the walk gives
/// up. A missing page 7 with a live page 8 happens on sites that prune
/// listings.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Builds the URL for catalog page `page`.
///
/// Page 1 is the start URL unchanged. For later pages, an existing
/// pagination parameter is rewritten in place; otherwise `page=N` is
/// appended. Other query parameters survive untouched.
#[must_use]
pub fn page_url(base: &Url, page: u32) -> Url {
    if page <= 1 {
        return base.clone();
    }

    let pairs: Vec<(String, String)> = base
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let existing = pairs
        .iter()
        .map(|(k, _)| k.as_str())
        .find(|k| PAGINATION_PARAMS.contains(k))
        .map(str::to_owned);

    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        let page_value = page.to_string();
        match existing {
            Some(param) => {
                for (k, v) in &pairs {
                    if *k == param {
                        query.append_pair(k, &page_value);
                    } else {
                        query.append_pair(k, v);
                    }
                }
            }
            None => {
                for (k, v) in &pairs {
                    query.append_pair(k, v);
                }
                query.append_pair("page", &page_value);
            }
        }
    }
    url
}

/// Tracks how far the walk has gone and when it must stop.
#[derive(Debug)]
pub struct PaginationTracker {
    max_pages: u32,
    next_page: u32,
    consecutive_failures: u32,
}

impl PaginationTracker {
    /// Creates a tracker that will issue at most `max_pages` pages.
    #[must_use]
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages,
            next_page: 0,
            consecutive_failures: 0,
        }
    }

    /// Returns the next page number to fetch, or `None` once `max_pages`
    /// is exhausted.
    pub fn next_page(&mut self) -> Option<u32> {
        if self.next_page >= self.max_pages {
            return None;
        }
        self.next_page += 1;
        Some(self.next_page)
    }

    /// Records a fetched catalog page, clearing the failure streak.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Records a permanently failed catalog page. Returns `true` when the
    /// failure streak says the walk should stop.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES
    }
}
