//! The unit of crawl work.

use url::Url;

/// What kind of page a task fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// A paginated listing page that yields product links.
    Catalog,
    /// A product detail page that yields a record.
    Detail,
}

/// One page to fetch.
#[derive(Debug, Clone)]
pub struct PageTask {
    pub url: Url,
    pub kind: PageKind,
    /// Catalog page number for catalog tasks; the spawning catalog page
    /// number for detail tasks.
    pub depth: u32,
    /// Attempts consumed so far; filled in by the fetch loop.
    pub attempt: u32,
}

impl PageTask {
    /// Creates a catalog page task.
    #[must_use]
    pub fn catalog(url: Url, page: u32) -> Self {
        Self {
            url,
            kind: PageKind::Catalog,
            depth: page,
            attempt: 0,
        }
    }

    /// Creates a detail page task discovered on catalog page `page`.
    #[must_use]
    pub fn detail(url: Url, page: u32) -> Self {
        Self {
            url,
            kind: PageKind::Detail,
            depth: page,
            attempt: 0,
        }
    }
}
