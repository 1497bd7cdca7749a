//! Crawl orchestration.
//!
//! The engine walks catalog pages sequentially and fans detail pages out to
//! spawned tasks. Every fetch, catalog or detail, goes through the same
//! governor, so the adaptive ceiling sees the whole run's traffic.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::aggregate::{AcceptedRecord, ResultAggregator, RunStatsSnapshot};
use crate::config::{ConfigError, CrawlConfig};
use crate::crawl::task::PageTask;
use crate::crawl::walker::{page_url, PaginationTracker};
use crate::dedup::FingerprintStore;
use crate::extract::links::extract_catalog_links;
use crate::extract::record::extract_record;
use crate::fetch::client::HttpClient;
use crate::fetch::governor::ConcurrencyGovernor;
use crate::fetch::retry::{self, FetchResolution};
use crate::shutdown::StopSignal;

/// Errors that abort a run before it starts. Once crawling, per-page
/// failures are counted, never raised.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("invalid start URL {url}: {reason}")]
    InvalidStartUrl { url: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One crawl run over one catalog.
pub struct CrawlEngine {
    config: Arc<CrawlConfig>,
    client: HttpClient,
    governor: ConcurrencyGovernor,
    aggregator: Arc<ResultAggregator>,
    stop: StopSignal,
}

impl std::fmt::Debug for CrawlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlEngine")
            .field("governor", &self.governor)
            .finish_non_exhaustive()
    }
}

impl CrawlEngine {
    /// Builds an engine and the stream its accepted records arrive on.
    ///
    /// The receiver can be consumed while [`run`](Self::run) is still in
    /// flight; it ends when the engine is dropped.
    pub fn new(
        config: CrawlConfig,
    ) -> Result<(Self, UnboundedReceiver<AcceptedRecord>), CrawlError> {
        config.validate()?;
        let client = HttpClient::with_user_agent(config.fetch_timeout(), &config.user_agent);
        let governor = ConcurrencyGovernor::new(config.governor_limits());
        let (aggregator, receiver) = ResultAggregator::new();
        let aggregator = Arc::new(aggregator);

        // Ceiling adjustments land in the stats the moment they happen,
        // even while only detail tasks are completing fetches.
        aggregator.set_concurrency(governor.current_ceiling());
        {
            let aggregator = Arc::clone(&aggregator);
            governor.set_ceiling_listener(move |ceiling| aggregator.set_concurrency(ceiling));
        }

        let engine = Self {
            config: Arc::new(config),
            client,
            governor,
            aggregator,
            stop: StopSignal::new(),
        };
        Ok((engine, receiver))
    }

    /// Handle for stopping this run from outside (signal handler, time
    /// budget, caller policy).
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Live counters for this run.
    #[must_use]
    pub fn stats(&self) -> RunStatsSnapshot {
        self.aggregator.snapshot()
    }

    /// Crawls the catalog starting at `start_url`.
    ///
    /// Terminates when the walk completes, the product cap or time budget
    /// is hit, or the stop signal fires; always returns the final counter
    /// snapshot. In-flight detail fetches are drained before returning.
    #[instrument(skip(self, start_url), fields(start_url = %start_url))]
    pub async fn run(&self, start_url: &str) -> Result<RunStatsSnapshot, CrawlError> {
        let base = Url::parse(start_url).map_err(|e| CrawlError::InvalidStartUrl {
            url: start_url.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(CrawlError::InvalidStartUrl {
                url: start_url.to_owned(),
                reason: format!("unsupported scheme '{}'", base.scheme()),
            });
        }

        // Wake pending admissions the moment the run is stopped.
        let closer = {
            let stop = self.stop.clone();
            let governor = self.governor.clone();
            tokio::spawn(async move {
                stop.wait().await;
                governor.close();
            })
        };
        let watchdog = self.config.time_budget().map(|budget| {
            let stop = self.stop.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(budget) => {
                        info!(budget_secs = budget.as_secs(), "time budget exhausted");
                        stop.trigger();
                    }
                    () = stop.wait() => {}
                }
            })
        });

        info!(ceiling = self.governor.current_ceiling(), "crawl starting");

        let policy = self.config.retry_policy();
        // Exact-URL seen set for the frontier; canonical dedup happens in
        // the aggregator so tracking-parameter twins are counted there.
        let frontier = FingerprintStore::new();
        let mut detail_tasks: JoinSet<()> = JoinSet::new();
        let mut tracker = PaginationTracker::new(self.config.max_pages);

        while let Some(page) = tracker.next_page() {
            if self.stop.is_triggered() || self.product_cap_reached() {
                break;
            }

            let mut task = PageTask::catalog(page_url(&base, page), page);
            self.aggregator.record_page_attempt();
            let resolution =
                retry::execute(&self.client, &task.url, &policy, &self.governor, &self.stop).await;

            match resolution {
                FetchResolution::Fetched { page: fetched, attempts } => {
                    task.attempt = attempts;
                    self.aggregator.record_retries(task.attempt - 1);
                    self.aggregator.record_page_success();
                    tracker.record_success();

                    let links = extract_catalog_links(&fetched.body, &task.url);
                    let new_links: Vec<Url> = links
                        .into_iter()
                        .filter(|link| frontier.register(link.as_str()))
                        .collect();
                    if new_links.is_empty() {
                        debug!(page = task.depth, "no new product links, walk complete");
                        break;
                    }
                    info!(page = task.depth, links = new_links.len(), "catalog page walked");

                    for link in new_links {
                        if self.stop.is_triggered() || self.product_cap_reached() {
                            break;
                        }
                        detail_tasks.spawn(fetch_detail(
                            self.client.clone(),
                            PageTask::detail(link, page),
                            self.governor.clone(),
                            self.stop.clone(),
                            Arc::clone(&self.aggregator),
                            Arc::clone(&self.config),
                        ));
                    }
                }
                FetchResolution::Failed { error, attempts } => {
                    task.attempt = attempts;
                    self.aggregator.record_retries(task.attempt - 1);
                    self.aggregator.record_page_failure();
                    warn!(page = task.depth, error = %error, "catalog page failed");
                    if tracker.record_failure() {
                        warn!("giving up on pagination after repeated failures");
                        break;
                    }
                }
                FetchResolution::Cancelled => break,
            }
        }

        // Let in-flight detail fetches finish; they observe the stop signal
        // themselves.
        while detail_tasks.join_next().await.is_some() {}

        closer.abort();
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let snapshot = self.aggregator.snapshot();
        info!(
            pages_attempted = snapshot.pages_attempted,
            pages_succeeded = snapshot.pages_succeeded,
            pages_failed = snapshot.pages_failed,
            products_accepted = snapshot.products_accepted,
            duplicates_skipped = snapshot.duplicates_skipped,
            retries = snapshot.retries,
            "crawl finished"
        );
        Ok(snapshot)
    }

    fn product_cap_reached(&self) -> bool {
        self.aggregator.products_accepted() >= self.config.max_products
    }
}

/// Fetches one detail page, extracts it, and submits the result.
async fn fetch_detail(
    client: HttpClient,
    mut task: PageTask,
    governor: ConcurrencyGovernor,
    stop: StopSignal,
    aggregator: Arc<ResultAggregator>,
    config: Arc<CrawlConfig>,
) {
    if stop.is_triggered() || aggregator.products_accepted() >= config.max_products {
        return;
    }

    aggregator.record_page_attempt();
    let policy = config.retry_policy();
    match retry::execute(&client, &task.url, &policy, &governor, &stop).await {
        FetchResolution::Fetched { page, attempts } => {
            task.attempt = attempts;
            aggregator.record_retries(task.attempt - 1);
            aggregator.record_page_success();

            match extract_record(
                &page.body,
                &task.url,
                &config.recognized_currencies,
                &config.default_currency,
            ) {
                Ok(candidate) => {
                    // Re-check the cap: it may have been reached while this
                    // page was in flight.
                    if aggregator.products_accepted() >= config.max_products {
                        return;
                    }
                    if aggregator.submit(candidate)
                        && aggregator.products_accepted() >= config.max_products
                    {
                        info!(cap = config.max_products, "product cap reached");
                        stop.trigger();
                    }
                }
                Err(failure) => {
                    debug!(url = %task.url, %failure, "detail page rejected");
                    aggregator.record_validation_failure(failure);
                }
            }
        }
        FetchResolution::Failed { error, attempts } => {
            task.attempt = attempts;
            aggregator.record_retries(task.attempt - 1);
            aggregator.record_page_failure();
            debug!(url = %task.url, error = %error, "detail page failed");
        }
        FetchResolution::Cancelled => {}
    }
}
