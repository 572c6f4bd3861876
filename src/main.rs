//! # rmrb_fetch
//!
//! Retrieves the People's Daily web edition in two independent ways:
//! the printed pages as one merged PDF per day, and the articles of a
//! layout page as a single plain-text file.
//!
//! ## Usage
//!
//! ```sh
//! rmrb_fetch papers                 # run now, then daily at 08:00
//! rmrb_fetch papers --once          # single run
//! rmrb_fetch articles -o out.txt    # today's page 1 articles
//! ```
//!
//! ## Architecture
//!
//! `papers` runs a scheduled pipeline:
//! 1. **Discovery**: Read the edition date and page links from the front page
//! 2. **Indexing**: Visit each page and pick up its PDF link
//! 3. **Download**: Fetch each PDF sequentially with randomized pacing
//! 4. **Merge**: Keep the files that open as PDFs, merge them, remove the pieces
//!
//! `articles` runs once: listing page, then each article in order, appended
//! to the output file as it arrives.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod digest;
mod edition;
mod fetch;
mod models;
mod outputs;
mod pdf;
mod schedule;
mod scrapers;
mod utils;

use cli::{ArticlesArgs, Cli, Command, PapersArgs};
use config::Settings;
use fetch::{HttpFetcher, RetryFetch};
use schedule::Schedule;

/// Console logging, plus a plain-text log file when `log_file` is given.
///
/// The returned guard flushes the file writer on drop and must be held
/// for the life of the process.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tfmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().unwrap_or_else(|| "rmrb_download.log".as_ref());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tfmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
    guard
}

fn build_fetcher(settings: &Settings) -> Result<RetryFetch<HttpFetcher>, Box<dyn Error>> {
    let http = HttpFetcher::new(&settings.http)?;
    Ok(RetryFetch::new(
        http,
        settings.http.max_retries,
        settings.http.retry_base_delay(),
    ))
}

#[instrument(level = "info", skip_all, fields(once = args.once))]
async fn run_papers(settings: Settings, args: &PapersArgs) -> Result<(), Box<dyn Error>> {
    let fetcher = build_fetcher(&settings)?;
    let papers = &settings.papers;
    info!(
        root = %papers.root_url,
        output_dir = %papers.output_dir.display(),
        run_at = %papers.run_at,
        "Daily edition downloader configured"
    );

    if args.once {
        let report = edition::run_once(&fetcher, papers).await?;
        if !report.is_success() {
            return Err(format!("no pages merged for {}", report.date).into());
        }
        return Ok(());
    }

    let schedule = Schedule::from_settings(papers)?;
    info!(at = %schedule.at, run_on_start = schedule.run_on_start, "Daily downloader started");
    let fetcher = &fetcher;
    schedule.run(move || edition::run_once(fetcher, papers)).await;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_articles(settings: Settings, args: &ArticlesArgs) -> Result<(), Box<dyn Error>> {
    let fetcher = build_fetcher(&settings)?;
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let listing_url = settings.articles.listing_url(date, args.page)?;
    debug!(%date, page = args.page, %listing_url, "Resolved listing page");

    let articles = digest::run(&fetcher, &settings.articles, &listing_url).await?;
    info!(
        count = articles.len(),
        path = %settings.articles.output.display(),
        "Articles saved"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    let mut settings = config::load_settings(args.config.as_deref())?;
    match &args.command {
        Command::Papers(papers) => papers.apply(&mut settings),
        Command::Articles(articles) => articles.apply(&mut settings),
    }
    settings.validate()?;

    let log_file = match &args.command {
        Command::Papers(_) => settings.papers.log_file.clone(),
        Command::Articles(_) => None,
    };
    let _guard = init_tracing(log_file.as_deref());

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "rmrb_fetch starting up");

    let result = match &args.command {
        Command::Papers(papers) => run_papers(settings, papers).await,
        Command::Articles(articles) => run_articles(settings, articles).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, secs = elapsed.as_secs(), "Execution complete"),
        Err(e) => error!(?elapsed, error = %e, "Execution failed"),
    }
    result
}
