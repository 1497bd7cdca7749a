//! Crawl orchestration: page tasks, pagination walking, and the engine
//! that ties fetching and extraction together.

pub mod engine;
pub mod task;
pub mod walker;

pub use engine::{CrawlEngine, CrawlError};
pub use task::{PageKind, PageTask};
pub use walker::{page_url, PaginationTracker, MAX_CONSECUTIVE_FAILURES};
