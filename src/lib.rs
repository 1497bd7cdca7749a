//! Catalog Scraper Core Library
//!
//! Adaptive concurrent crawl-and-extract pipeline for paginated e-commerce
//! catalogs. The pipeline walks a catalog's listing pages, discovers product
//! detail links, fetches them through an adaptive concurrency governor with
//! retry/backoff, extracts name/price records, deduplicates them by
//! canonical URL fingerprint, and streams accepted records to the caller
//! alongside honest run statistics.
//!
//! # Architecture
//!
//! - [`config`] - validated configuration bundle
//! - [`fetch`] - HTTP client, error taxonomy, retry loop, concurrency
//!   governor
//! - [`crawl`] - pagination walking and run orchestration
//! - [`extract`] - catalog link and product record extraction
//! - [`dedup`] - URL canonicalization and the fingerprint store
//! - [`aggregate`] - dedup gate, run statistics, accepted-record stream
//! - [`shutdown`] - run-scoped cooperative stop signal
//!
//! # Example
//!
//! ```no_run
//! use catalog_core::config::CrawlConfig;
//! use catalog_core::crawl::CrawlEngine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (engine, mut records) = CrawlEngine::new(CrawlConfig::default())?;
//! let exporter = tokio::spawn(async move {
//!     while let Some(record) = records.recv().await {
//!         println!("{} {}", record.sequence_id, record.record.name);
//!     }
//! });
//! let stats = engine.run("https://shop.example.com/catalog").await?;
//! println!("accepted {} products", stats.products_accepted);
//! drop(engine);
//! exporter.await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod aggregate;
pub mod config;
pub mod crawl;
pub mod dedup;
pub mod extract;
pub mod fetch;
pub mod shutdown;

pub use aggregate::{AcceptedRecord, ResultAggregator, RunStatsSnapshot};
pub use config::{ConfigError, CrawlConfig};
pub use crawl::{CrawlEngine, CrawlError, PageKind, PageTask};
pub use dedup::{fingerprint, FingerprintStore};
pub use extract::{CandidateRecord, CurrencyMarker, ValidationFailure};
pub use fetch::{FetchError, HttpClient};
pub use shutdown::StopSignal;
