//! HTTP fetch worker.
//!
//! A thin wrapper around a shared `reqwest::Client`. One call performs one
//! GET with the configured timeout and returns the body with its status, or
//! a classified [`FetchError`]. Retry policy lives a layer up in
//! [`crate::fetch::retry`]; this type never retries.

use std::time::{Duration, Instant};

use reqwest::header::RETRY_AFTER;
use tracing::debug;
use url::Url;

use crate::fetch::error::FetchError;

/// Browser-like User-Agent sent with every request.
///
/// Several catalog platforms serve reduced markup (or a block page) to
/// clients that identify as bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Default per-request timeout when none is configured.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A successfully fetched page.
#[derive(Debug)]
pub struct PageFetch {
    /// Decoded response body.
    pub body: String,
    /// HTTP status code (always a success code here).
    pub http_status: u16,
    /// Wall-clock time from request start to full body.
    pub elapsed: Duration,
}

/// Shared HTTP client for all fetch tasks in a run.
///
/// Cheap to clone; clones share the underlying connection pool and cookie
/// store.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Creates a client with the default timeout and User-Agent.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Creates a client with a custom per-request timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_user_agent(timeout, BROWSER_USER_AGENT)
    }

    /// Creates a client with a custom timeout and User-Agent.
    #[must_use]
    #[allow(clippy::expect_used)] // builder only fails on TLS backend misconfiguration
    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .gzip(true)
            .connect_timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { client, timeout }
    }

    /// Returns the configured per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetches one page.
    ///
    /// Returns the decoded body and status on 2xx, or a [`FetchError`]
    /// otherwise. A non-success status consumes the response without reading
    /// the body; the `Retry-After` header is captured when present so the
    /// retry layer can honor it.
    pub async fn fetch_page(&self, url: &Url) -> Result<PageFetch, FetchError> {
        let started = Instant::now();

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(url.as_str())
                } else {
                    FetchError::network(url.as_str(), e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            return Err(match retry_after {
                Some(value) => {
                    FetchError::http_status_with_retry_after(url.as_str(), status.as_u16(), value)
                }
                None => FetchError::http_status(url.as_str(), status.as_u16()),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url.as_str())
            } else {
                FetchError::network(url.as_str(), e)
            }
        })?;

        let elapsed = started.elapsed();
        debug!(
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "page fetched"
        );

        Ok(PageFetch {
            body,
            http_status: status.as_u16(),
            elapsed,
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
