//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use catalog_core::CrawlConfig;

/// Crawl a paginated e-commerce catalog and extract product records.
///
/// Walks the catalog's listing pages, fetches product detail pages through
/// an adaptive concurrency governor, and writes accepted records as JSON
/// lines.
#[derive(Debug, Parser)]
#[command(name = "catalog-scraper", version)]
pub struct Args {
    /// Catalog start URL (the first listing page)
    pub start_url: String,

    /// Path to a JSON config file; flags below override its values
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Starting concurrency ceiling
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum catalog pages to walk
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: Option<u32>,

    /// Stop after this many accepted products
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_products: Option<u32>,

    /// Stop the run after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub time_budget: Option<u64>,

    /// Write accepted records as JSON lines to this file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Applies command-line overrides on top of a loaded config.
    ///
    /// A `--concurrency` outside the config's bounds drags the bound along
    /// so the result still validates.
    pub fn apply_to(&self, config: &mut CrawlConfig) {
        if let Some(concurrency) = self.concurrency {
            let concurrency = usize::from(concurrency);
            config.initial_concurrency = concurrency;
            config.min_concurrency = config.min_concurrency.min(concurrency);
            config.max_concurrency = config.max_concurrency.max(concurrency);
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }
        if let Some(max_products) = self.max_products {
            config.max_products = max_products as usize;
        }
        if let Some(seconds) = self.time_budget {
            config.time_budget_secs = Some(seconds);
        }
    }
}
