//! Crawl configuration.
//!
//! All tunables live in one validated bundle. Defaults are deliberately
//! polite: a modest starting concurrency, honest backoff, and hard caps on
//! pages and products.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::extract::price::{default_currency_markers, CurrencyMarker};
use crate::fetch::client::BROWSER_USER_AGENT;
use crate::fetch::governor::GovernorLimits;
use crate::fetch::retry::RetryPolicy;

/// Hard upper bound on the concurrency ceiling; nothing polite happens
/// above this.
pub const MAX_CONCURRENCY_BOUND: usize = 100;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// All knobs for one crawl run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlConfig {
    /// Concurrency ceiling at the start of the run.
    pub initial_concurrency: usize,
    /// Floor the governor never shrinks below.
    pub min_concurrency: usize,
    /// Cap the governor never grows above.
    pub max_concurrency: usize,
    /// Attempts per page, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, milliseconds.
    pub base_backoff_ms: u64,
    /// Cap on the exponential backoff, milliseconds.
    pub max_backoff_ms: u64,
    /// Per-request timeout, seconds.
    pub fetch_timeout_secs: u64,
    /// Catalog pages walked at most.
    pub max_pages: u32,
    /// Accepted products after which the run stops.
    pub max_products: usize,
    /// Ordered currency marker table; first match wins.
    pub recognized_currencies: Vec<CurrencyMarker>,
    /// Currency reported when no marker matches.
    pub default_currency: String,
    /// Optional wall-clock budget for the whole run, seconds.
    pub time_budget_secs: Option<u64>,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: 8,
            min_concurrency: 1,
            max_concurrency: 40,
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 10_000,
            fetch_timeout_secs: 10,
            max_pages: 50,
            max_products: 1000,
            recognized_currencies: default_currency_markers(),
            default_currency: "KES".to_owned(),
            time_budget_secs: None,
            user_agent: BROWSER_USER_AGENT.to_owned(),
        }
    }
}

impl CrawlConfig {
    /// Loads and validates a JSON config file. Missing fields fall back to
    /// the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "min_concurrency must be at least 1".to_owned(),
            ));
        }
        if self.min_concurrency > self.initial_concurrency
            || self.initial_concurrency > self.max_concurrency
        {
            return Err(ConfigError::Invalid(format!(
                "concurrency bounds must satisfy min <= initial <= max (got {} <= {} <= {})",
                self.min_concurrency, self.initial_concurrency, self.max_concurrency
            )));
        }
        if self.max_concurrency > MAX_CONCURRENCY_BOUND {
            return Err(ConfigError::Invalid(format!(
                "max_concurrency must not exceed {MAX_CONCURRENCY_BOUND}"
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid(
                "max_pages must be at least 1".to_owned(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be at least 1".to_owned(),
            ));
        }
        if self.default_currency.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_currency must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Governor bounds derived from this config.
    #[must_use]
    pub fn governor_limits(&self) -> GovernorLimits {
        GovernorLimits {
            initial: self.initial_concurrency,
            min: self.min_concurrency,
            max: self.max_concurrency,
        }
    }

    /// Retry policy derived from this config.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Per-request timeout as a `Duration`.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Run time budget as a `Duration`, if configured.
    #[must_use]
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }
}
