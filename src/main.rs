//! CLI entry point for the catalog scraper.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use catalog_core::{AcceptedRecord, CrawlConfig, CrawlEngine};
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let mut config = match &args.config {
        Some(path) => CrawlConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => CrawlConfig::default(),
    };
    args.apply_to(&mut config);

    let (engine, records) = CrawlEngine::new(config).context("failed to build crawl engine")?;

    // Ctrl-C stops the run gracefully; in-flight fetches drain.
    let stop = engine.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            stop.trigger();
        }
    });

    let exporter = spawn_exporter(records, args.output.clone());

    let stats = engine.run(&args.start_url).await?;

    // Dropping the engine closes the record stream so the exporter finishes.
    drop(engine);
    let exported = exporter
        .await
        .context("exporter task panicked")?
        .context("failed to write records")?;

    info!(
        products_accepted = stats.products_accepted,
        duplicates_skipped = stats.duplicates_skipped,
        pages_attempted = stats.pages_attempted,
        pages_failed = stats.pages_failed,
        retries = stats.retries,
        exported,
        "run complete"
    );

    let rejected = stats.rejected_missing_name
        + stats.rejected_missing_price
        + stats.rejected_unparseable_price;
    if rejected > 0 {
        info!(
            missing_name = stats.rejected_missing_name,
            missing_price = stats.rejected_missing_price,
            unparseable_price = stats.rejected_unparseable_price,
            "some detail pages were rejected"
        );
    }

    Ok(())
}

/// Streams accepted records out as JSON lines while the crawl runs.
fn spawn_exporter(
    mut records: UnboundedReceiver<AcceptedRecord>,
    output: Option<PathBuf>,
) -> JoinHandle<Result<usize>> {
    tokio::spawn(async move {
        let mut writer: Box<dyn Write + Send> = match output {
            Some(path) => {
                let file = File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(std::io::stdout()),
        };

        let mut count = 0usize;
        while let Some(record) = records.recv().await {
            serde_json::to_writer(&mut writer, &record).context("failed to serialize record")?;
            writer.write_all(b"\n")?;
            count += 1;
        }
        writer.flush()?;
        Ok(count)
    })
}
