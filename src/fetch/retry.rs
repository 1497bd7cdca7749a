//! Retry policy and the governed fetch loop.
//!
//! Failures are classified into three classes: transient failures are
//! retried with exponential backoff and jitter, rate limiting is retried
//! with a longer delay (honoring `Retry-After` when the server sends one),
//! and fatal failures are returned immediately.
//!
//! The loop acquires a fresh governor permit for every attempt and always
//! releases it before sleeping, so a backing-off task never blocks an
//! admission slot.

use std::time::{Duration, SystemTime};

use rand::Rng;
use tracing::{debug, warn};
use url::Url;

use crate::fetch::client::{HttpClient, PageFetch};
use crate::fetch::error::FetchError;
use crate::fetch::governor::{ConcurrencyGovernor, Outcome};
use crate::shutdown::StopSignal;

/// Maximum random jitter added to every backoff delay.
const JITTER_MAX_MS: u64 = 500;

/// Upper bound on a server-supplied Retry-After delay.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Backoff configuration for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the exponential delay (before jitter).
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Deterministic backoff for the given attempt: `base * 2^(attempt-1)`,
    /// capped at `max_delay`. Jitter is added separately.
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let millis = u64::try_from(self.base_delay.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(1u64 << exp);
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Backoff for the given attempt with 0–500 ms of random jitter, so
    /// simultaneous failures do not retry in lockstep.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=JITTER_MAX_MS));
        self.base_delay_for(attempt) + jitter
    }
}

/// How a fetch failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying after a backoff.
    Transient,
    /// Worth retrying after a longer delay; the server asked us to slow
    /// down.
    RateLimited,
    /// The server gave a definitive answer. Never retried.
    Fatal,
}

impl FailureClass {
    /// Maps the class to the governor's outcome vocabulary. Rate limiting
    /// counts as a transient error so the ceiling reacts to throttling.
    #[must_use]
    pub fn outcome(self) -> Outcome {
        match self {
            Self::Transient | Self::RateLimited => Outcome::TransientError,
            Self::Fatal => Outcome::FatalError,
        }
    }
}

/// Classifies a fetch error.
///
/// Timeouts, network failures, 5xx and 408 are transient; 429 is rate
/// limited; everything else (including 404 and malformed URLs) is fatal.
#[must_use]
pub fn classify(error: &FetchError) -> FailureClass {
    match error {
        FetchError::Timeout { .. } | FetchError::Network { .. } => FailureClass::Transient,
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),
        FetchError::InvalidUrl { .. } => FailureClass::Fatal,
    }
}

/// Classifies an HTTP status code.
#[must_use]
pub fn classify_http_status(status: u16) -> FailureClass {
    match status {
        429 => FailureClass::RateLimited,
        408 | 500..=599 => FailureClass::Transient,
        _ => FailureClass::Fatal,
    }
}

/// Parses a `Retry-After` header value.
///
/// Accepts delta-seconds or an RFC 7231 HTTP-date; a date in the past
/// parses as zero. Returns `None` for anything unintelligible.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = httpdate::parse_http_date(value).ok()?;
    Some(
        when.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

/// Result of a governed fetch with retries.
#[derive(Debug)]
pub enum FetchResolution {
    /// The page was fetched; `attempts` counts every try including the
    /// successful one.
    Fetched { page: PageFetch, attempts: u32 },
    /// All attempts failed, or the failure was fatal. Carries the last
    /// error.
    Failed { error: FetchError, attempts: u32 },
    /// The stop signal fired before the fetch resolved.
    Cancelled,
}

/// Fetches one page through the governor, retrying per the policy.
///
/// Each attempt holds its own permit for exactly the duration of the HTTP
/// request. The stop signal is observed before each admission and during
/// backoff sleeps; once the governor is closed, admission returns
/// [`FetchResolution::Cancelled`].
pub async fn execute(
    client: &HttpClient,
    url: &Url,
    policy: &RetryPolicy,
    governor: &ConcurrencyGovernor,
    stop: &StopSignal,
) -> FetchResolution {
    let mut attempt: u32 = 0;

    loop {
        if stop.is_triggered() {
            return FetchResolution::Cancelled;
        }
        let Some(permit) = governor.acquire().await else {
            return FetchResolution::Cancelled;
        };
        attempt += 1;

        match client.fetch_page(url).await {
            Ok(page) => {
                permit.release(Outcome::Success);
                return FetchResolution::Fetched {
                    page,
                    attempts: attempt,
                };
            }
            Err(error) => {
                let class = classify(&error);
                permit.release(class.outcome());

                if class == FailureClass::Fatal {
                    debug!(url = %url, error = %error, "fatal fetch failure, not retrying");
                    return FetchResolution::Failed {
                        error,
                        attempts: attempt,
                    };
                }
                if attempt >= policy.max_attempts {
                    warn!(
                        url = %url,
                        attempts = attempt,
                        error = %error,
                        "retries exhausted"
                    );
                    return FetchResolution::Failed {
                        error,
                        attempts: attempt,
                    };
                }

                let delay = retry_delay(policy, attempt, class, &error);
                debug!(
                    url = %url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::select! {
                    () = stop.wait() => return FetchResolution::Cancelled,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

fn retry_delay(
    policy: &RetryPolicy,
    attempt: u32,
    class: FailureClass,
    error: &FetchError,
) -> Duration {
    if class == FailureClass::RateLimited {
        if let FetchError::HttpStatus {
            retry_after: Some(value),
            ..
        } = error
        {
            if let Some(requested) = parse_retry_after(value) {
                return requested.min(MAX_RETRY_AFTER);
            }
        }
        // No usable Retry-After: back off one step harder than a plain
        // transient failure at this attempt.
        return policy.delay_for(attempt + 1);
    }
    policy.delay_for(attempt)
}
