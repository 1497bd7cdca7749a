//! Page fetching: shared HTTP client, error taxonomy, retry/backoff loop,
//! and the adaptive concurrency governor that gates all of it.

pub mod client;
pub mod error;
pub mod governor;
pub mod retry;

pub use client::{HttpClient, PageFetch, BROWSER_USER_AGENT};
pub use error::FetchError;
pub use governor::{ConcurrencyGovernor, GovernorLimits, GovernorPermit, Outcome};
pub use retry::{classify, execute, FailureClass, FetchResolution, RetryPolicy};
