//! Runtime settings loaded from an optional YAML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. CLI flags are applied on top in `main`.
//!
//! ```yaml
//! http:
//!   max_retries: 3
//! papers:
//!   output_dir: /srv/rmrb
//!   run_at: "07:30"
//! articles:
//!   output: today.txt
//! ```

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Browser identities rotated across requests.
const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
];

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub papers: PaperSettings,
    pub articles: ArticleSettings,
}

/// HTTP client behaviour shared by both commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agents: Vec<String>,
    pub referer: Option<String>,
    pub page_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Retries after the first failed attempt of any request.
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agents: USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            referer: Some("https://paper.people.com.cn/".to_string()),
            page_timeout_secs: 30,
            download_timeout_secs: 60,
            max_retries: 2,
            retry_base_delay_ms: 1000,
        }
    }
}

impl HttpSettings {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// The daily fetch-and-merge job.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    pub root_url: String,
    pub output_dir: PathBuf,
    /// File name prefix for per-page and merged PDFs.
    pub file_prefix: String,
    /// Local time of the daily run, `HH:MM`.
    pub run_at: String,
    /// Run the job once immediately before the scheduler starts.
    pub run_on_start: bool,
    pub poll_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub log_file: Option<PathBuf>,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            root_url: "https://paper.people.com.cn/rmrb/".to_string(),
            output_dir: PathBuf::from("rmrb_downloads"),
            file_prefix: "rmrb".to_string(),
            run_at: "08:00".to_string(),
            run_on_start: true,
            poll_interval_secs: 60,
            error_backoff_secs: 300,
            delay_min_ms: 1000,
            delay_max_ms: 3000,
            log_file: Some(PathBuf::from("rmrb_download.log")),
        }
    }
}

impl PaperSettings {
    pub fn run_at_time(&self) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(&self.run_at, "%H:%M")
    }

    pub fn root(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.root_url)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    /// `{output_dir}/{prefix}-{date}-p{page:02}.pdf`
    pub fn page_path(&self, date_label: &str, page: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}-p{:02}.pdf", self.file_prefix, date_label, page))
    }

    /// `{output_dir}/{prefix}-{date}-full.pdf`
    pub fn merged_path(&self, date_label: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}-full.pdf", self.file_prefix, date_label))
    }
}

/// The listing-to-text scrape.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArticleSettings {
    /// Base of the per-day layout pages, ending in `/`.
    pub layout_base_url: String,
    /// Explicit listing page; overrides the date-based URL when set.
    pub listing_url: Option<String>,
    pub output: PathBuf,
    pub json_output: Option<PathBuf>,
}

impl Default for ArticleSettings {
    fn default() -> Self {
        Self {
            layout_base_url: "https://paper.people.com.cn/rmrb/pc/layout/".to_string(),
            listing_url: None,
            output: PathBuf::from("merged_articles.txt"),
            json_output: None,
        }
    }
}

impl ArticleSettings {
    /// The listing page to scrape: the explicit URL if configured, otherwise
    /// the layout page `{base}{YYYYMM}/{DD}/node_{NN}.html` for `date`.
    pub fn listing_url(&self, date: NaiveDate, page: u32) -> Result<Url, url::ParseError> {
        if let Some(explicit) = &self.listing_url {
            return Url::parse(explicit);
        }
        let base = Url::parse(&self.layout_base_url)?;
        base.join(&format!(
            "{}/{:02}/node_{:02}.html",
            date.format("%Y%m"),
            date.day(),
            page
        ))
    }
}

impl Settings {
    /// Reject settings that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        self.papers
            .run_at_time()
            .map_err(|e| format!("papers.run_at {:?} is not HH:MM: {e}", self.papers.run_at))?;
        self.papers.root()?;
        Url::parse(&self.articles.layout_base_url)?;
        if let Some(listing) = &self.articles.listing_url {
            Url::parse(listing)?;
        }
        if self.papers.delay_min_ms > self.papers.delay_max_ms {
            return Err(format!(
                "papers.delay_min_ms ({}) exceeds papers.delay_max_ms ({})",
                self.papers.delay_min_ms, self.papers.delay_max_ms
            )
            .into());
        }
        Ok(())
    }
}

/// Parse settings from YAML text.
pub fn parse_settings(raw: &str) -> Result<Settings, Box<dyn Error>> {
    let settings: Settings = if raw.trim().is_empty() {
        Settings::default()
    } else {
        serde_yaml::from_str(raw)?
    };
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `path`, or defaults when no path is given.
#[instrument(level = "info")]
pub fn load_settings(path: Option<&str>) -> Result<Settings, Box<dyn Error>> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let settings = parse_settings(&raw)?;
            info!(path, "Loaded configuration");
            Ok(settings)
        }
        None => {
            let settings = Settings::default();
            settings.validate()?;
            Ok(settings)
        }
    }
}
