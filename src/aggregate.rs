//! Result aggregation: dedup gate, sequence stamping, run statistics, and
//! the accepted-record output stream.
//!
//! The aggregator is the single funnel every extracted record passes
//! through. It is shared across all extraction tasks and every method is
//! callable concurrently; counters are atomics and the dedup gate is the
//! lock-free [`FingerprintStore`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::dedup::{fingerprint, FingerprintStore};
use crate::extract::record::{CandidateRecord, ValidationFailure};

/// A record that passed dedup, stamped with its acceptance order.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedRecord {
    pub record: CandidateRecord,
    /// Canonical dedup key; unique among all accepted records of a run.
    pub fingerprint: String,
    /// Monotonically increasing acceptance number, starting at 1.
    pub sequence_id: u64,
    /// Acceptance wall-clock time, milliseconds since the Unix epoch.
    pub accepted_at_ms: u64,
}

/// Point-in-time view of a run's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatsSnapshot {
    pub pages_attempted: usize,
    pub pages_succeeded: usize,
    pub pages_failed: usize,
    pub products_accepted: usize,
    pub duplicates_skipped: usize,
    pub rejected_missing_name: usize,
    pub rejected_missing_price: usize,
    pub rejected_unparseable_price: usize,
    pub retries: usize,
    pub concurrency_current: usize,
}

/// Shared sink for extracted records and crawl events.
#[derive(Debug)]
pub struct ResultAggregator {
    store: FingerprintStore,
    sequence: AtomicU64,
    sender: mpsc::UnboundedSender<AcceptedRecord>,
    pages_attempted: AtomicUsize,
    pages_succeeded: AtomicUsize,
    pages_failed: AtomicUsize,
    products_accepted: AtomicUsize,
    duplicates_skipped: AtomicUsize,
    rejected_missing_name: AtomicUsize,
    rejected_missing_price: AtomicUsize,
    rejected_unparseable_price: AtomicUsize,
    retries: AtomicUsize,
    concurrency_current: AtomicUsize,
}

impl ResultAggregator {
    /// Creates an aggregator and the receiving end of its record stream.
    ///
    /// The stream is unbounded and delivered in acceptance order; exporters
    /// consume it incrementally while the crawl is still running.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AcceptedRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let aggregator = Self {
            store: FingerprintStore::new(),
            sequence: AtomicU64::new(0),
            sender,
            pages_attempted: AtomicUsize::new(0),
            pages_succeeded: AtomicUsize::new(0),
            pages_failed: AtomicUsize::new(0),
            products_accepted: AtomicUsize::new(0),
            duplicates_skipped: AtomicUsize::new(0),
            rejected_missing_name: AtomicUsize::new(0),
            rejected_missing_price: AtomicUsize::new(0),
            rejected_unparseable_price: AtomicUsize::new(0),
            retries: AtomicUsize::new(0),
            concurrency_current: AtomicUsize::new(0),
        };
        (aggregator, receiver)
    }

    /// Submits a candidate record.
    ///
    /// Returns `true` if the record was new and pushed to the stream,
    /// `false` if its fingerprint was already accepted this run. Exactly
    /// one of any set of concurrently submitted equivalents wins.
    pub fn submit(&self, record: CandidateRecord) -> bool {
        let key = fingerprint(&record.source_url);
        if !self.store.register(&key) {
            self.duplicates_skipped.fetch_add(1, Ordering::SeqCst);
            trace!(url = %record.source_url, "duplicate record skipped");
            return false;
        }

        let sequence_id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.products_accepted.fetch_add(1, Ordering::SeqCst);
        let accepted = AcceptedRecord {
            record,
            fingerprint: key,
            sequence_id,
            accepted_at_ms: epoch_millis(),
        };
        // A closed receiver means the exporter is gone; the run's counters
        // are still the source of truth.
        let _ = self.sender.send(accepted);
        true
    }

    /// Records a rejected detail page.
    pub fn record_validation_failure(&self, failure: ValidationFailure) {
        let counter = match failure {
            ValidationFailure::MissingName => &self.rejected_missing_name,
            ValidationFailure::MissingPrice => &self.rejected_missing_price,
            ValidationFailure::UnparseablePrice => &self.rejected_unparseable_price,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Records that a page fetch was started.
    pub fn record_page_attempt(&self) {
        self.pages_attempted.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a page fetch that ultimately succeeded.
    pub fn record_page_success(&self) {
        self.pages_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a page fetch that failed fatally or exhausted its retries.
    pub fn record_page_failure(&self) {
        self.pages_failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Adds `count` retries to the running total.
    pub fn record_retries(&self, count: u32) {
        if count > 0 {
            self.retries.fetch_add(count as usize, Ordering::SeqCst);
        }
    }

    /// Publishes the governor's current ceiling for snapshots.
    pub fn set_concurrency(&self, ceiling: usize) {
        self.concurrency_current.store(ceiling, Ordering::SeqCst);
    }

    /// Number of records accepted so far.
    #[must_use]
    pub fn products_accepted(&self) -> usize {
        self.products_accepted.load(Ordering::SeqCst)
    }

    /// Takes a consistent snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            pages_attempted: self.pages_attempted.load(Ordering::SeqCst),
            pages_succeeded: self.pages_succeeded.load(Ordering::SeqCst),
            pages_failed: self.pages_failed.load(Ordering::SeqCst),
            products_accepted: self.products_accepted.load(Ordering::SeqCst),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::SeqCst),
            rejected_missing_name: self.rejected_missing_name.load(Ordering::SeqCst),
            rejected_missing_price: self.rejected_missing_price.load(Ordering::SeqCst),
            rejected_unparseable_price: self.rejected_unparseable_price.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
            concurrency_current: self.concurrency_current.load(Ordering::SeqCst),
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use url::Url;

    fn candidate(url: &str) -> CandidateRecord {
        CandidateRecord {
            source_url: Url::parse(url).unwrap(),
            name: "Brake Pad Set".to_owned(),
            raw_price_text: "KSh 4,500".to_owned(),
            currency_hint: "KES".to_owned(),
            price: 4500.0,
            image_url: None,
            extra_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn test_submit_accepts_new_record() {
        let (agg, mut rx) = ResultAggregator::new();
        assert!(agg.submit(candidate("https://shop.example.com/product/a")));

        let accepted = rx.try_recv().unwrap();
        assert_eq!(accepted.sequence_id, 1);
        assert!(accepted.accepted_at_ms > 0);
        assert_eq!(agg.snapshot().products_accepted, 1);
    }

    #[test]
    fn test_submit_skips_duplicate_fingerprint() {
        let (agg, mut rx) = ResultAggregator::new();
        assert!(agg.submit(candidate("https://shop.example.com/product/a")));
        // Same product behind a tracking parameter.
        assert!(!agg.submit(candidate(
            "https://shop.example.com/product/a?utm_source=promo"
        )));

        let snapshot = agg.snapshot();
        assert_eq!(snapshot.products_accepted, 1);
        assert_eq!(snapshot.duplicates_skipped, 1);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "duplicate must not reach the stream");
    }

    #[test]
    fn test_sequence_ids_are_monotonic_and_dense() {
        let (agg, mut rx) = ResultAggregator::new();
        for i in 0..5 {
            agg.submit(candidate(&format!("https://shop.example.com/product/{i}")));
        }
        for expected in 1..=5 {
            assert_eq!(rx.try_recv().unwrap().sequence_id, expected);
        }
    }

    #[test]
    fn test_validation_failures_count_separately() {
        let (agg, _rx) = ResultAggregator::new();
        agg.record_validation_failure(ValidationFailure::MissingName);
        agg.record_validation_failure(ValidationFailure::MissingPrice);
        agg.record_validation_failure(ValidationFailure::MissingPrice);
        agg.record_validation_failure(ValidationFailure::UnparseablePrice);

        let snapshot = agg.snapshot();
        assert_eq!(snapshot.rejected_missing_name, 1);
        assert_eq!(snapshot.rejected_missing_price, 2);
        assert_eq!(snapshot.rejected_unparseable_price, 1);
        assert_eq!(snapshot.products_accepted, 0);
    }

    #[test]
    fn test_page_and_retry_counters() {
        let (agg, _rx) = ResultAggregator::new();
        agg.record_page_attempt();
        agg.record_page_attempt();
        agg.record_page_success();
        agg.record_page_failure();
        agg.record_retries(2);
        agg.record_retries(0);
        agg.set_concurrency(6);

        let snapshot = agg.snapshot();
        assert_eq!(snapshot.pages_attempted, 2);
        assert_eq!(snapshot.pages_succeeded, 1);
        assert_eq!(snapshot.pages_failed, 1);
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.concurrency_current, 6);
    }

    #[test]
    fn test_submit_survives_dropped_receiver() {
        let (agg, rx) = ResultAggregator::new();
        drop(rx);
        assert!(agg.submit(candidate("https://shop.example.com/product/a")));
        assert_eq!(agg.snapshot().products_accepted, 1);
    }

    #[test]
    fn test_concurrent_submits_accept_each_url_once() {
        use std::sync::Arc;
        use std::thread;

        let (agg, mut rx) = ResultAggregator::new();
        let agg = Arc::new(agg);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let agg = Arc::clone(&agg);
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    agg.submit(candidate(&format!("https://shop.example.com/product/{i}")));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = agg.snapshot();
        assert_eq!(snapshot.products_accepted, 50);
        assert_eq!(snapshot.duplicates_skipped, 8 * 50 - 50);

        let mut ids = Vec::new();
        while let Ok(accepted) = rx.try_recv() {
            ids.push(accepted.sequence_id);
        }
        assert_eq!(ids.len(), 50);
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 50, "sequence ids must be unique");
    }
}
