//! Command-line interface definitions for rmrb_fetch.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Flags override values from the optional YAML configuration file.

use crate::config::Settings;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for rmrb_fetch.
///
/// # Examples
///
/// ```sh
/// # Download and merge today's edition now, then every day at 08:00
/// rmrb_fetch papers
///
/// # A single run into a custom directory
/// rmrb_fetch papers --once -o /srv/rmrb
///
/// # Scrape page 1 of a given day's edition to text
/// rmrb_fetch articles --date 2025-10-19 --page 1 -o rmrb.txt
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, global = true, env = "RMRB_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download every page PDF of the edition and merge them, daily
    Papers(PapersArgs),
    /// Scrape an article listing page into one text file
    Articles(ArticlesArgs),
}

#[derive(Args, Debug)]
pub struct PapersArgs {
    /// Front page of the newspaper's web edition
    #[arg(long)]
    pub root_url: Option<String>,

    /// Directory for per-page and merged PDFs
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Daily run time, HH:MM local time
    #[arg(long)]
    pub at: Option<String>,

    /// Run once and exit instead of scheduling
    #[arg(long)]
    pub once: bool,

    /// Log file appended alongside console output
    #[arg(long, env = "RMRB_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ArticlesArgs {
    /// Listing page to scrape; overrides --date/--page
    #[arg(long)]
    pub listing_url: Option<String>,

    /// Edition date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Page (layout node) number of the edition
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Text file to write
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write all articles as JSON to this path
    #[arg(long)]
    pub json: Option<PathBuf>,
}

impl PapersArgs {
    /// Apply flags on top of file settings.
    pub fn apply(&self, settings: &mut Settings) {
        let papers = &mut settings.papers;
        if let Some(root_url) = &self.root_url {
            papers.root_url = root_url.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            papers.output_dir = output_dir.clone();
        }
        if let Some(at) = &self.at {
            papers.run_at = at.clone();
        }
        if let Some(log_file) = &self.log_file {
            papers.log_file = Some(log_file.clone());
        }
    }
}

impl ArticlesArgs {
    /// Apply flags on top of file settings.
    pub fn apply(&self, settings: &mut Settings) {
        let articles = &mut settings.articles;
        if let Some(listing_url) = &self.listing_url {
            articles.listing_url = Some(listing_url.clone());
        }
        if let Some(output) = &self.output {
            articles.output = output.clone();
        }
        if let Some(json) = &self.json {
            articles.json_output = Some(json.clone());
        }
    }
}
