//! HTTP access to the newspaper site with exponential backoff retry logic.
//!
//! # Architecture
//!
//! The module uses a trait-based design so the workflows never depend on
//! `reqwest` directly:
//! - [`Fetcher`]: Core trait for loading HTML pages and downloading files
//! - [`HttpFetcher`]: `reqwest` client that presents browser-like headers and
//!   rotates its User-Agent on every request
//! - [`RetryFetch`]: Decorator that adds retry logic to any `Fetcher`
//!
//! # Retry Strategy
//!
//! - Configurable number of retries (2 by default)
//! - Exponential backoff starting at the configured base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to every delay

use crate::config::HttpSettings;
use crate::utils::pick_user_agent;
use rand::{Rng, rng};
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::{Duration as StdDuration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// An HTML page as served, after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL of the response; relative links resolve against this.
    pub url: Url,
    pub body: String,
}

/// Trait for the network operations the workflows need.
pub trait Fetcher {
    /// Load an HTML page.
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, Box<dyn Error>>;

    /// Stream the resource at `url` into `dest`, returning the bytes written.
    async fn download(&self, url: &Url, dest: &Path) -> Result<u64, Box<dyn Error>>;
}

/// `reqwest`-backed [`Fetcher`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agents: Vec<String>,
    page_timeout: StdDuration,
    download_timeout: StdDuration,
}

impl HttpFetcher {
    /// Build a client with the browser-like default headers.
    pub fn new(settings: &HttpSettings) -> Result<Self, Box<dyn Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3"),
        );
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        if let Some(referer) = &settings.referer {
            headers.insert(REFERER, HeaderValue::from_str(referer)?);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            user_agents: settings.user_agents.clone(),
            page_timeout: settings.page_timeout(),
            download_timeout: settings.download_timeout(),
        })
    }

    fn get(&self, url: &Url, timeout: StdDuration) -> reqwest::RequestBuilder {
        self.client
            .get(url.clone())
            .header(USER_AGENT, pick_user_agent(&self.user_agents))
            .timeout(timeout)
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("user_agents", &self.user_agents.len())
            .field("page_timeout", &self.page_timeout)
            .field("download_timeout", &self.download_timeout)
            .finish()
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, Box<dyn Error>> {
        let response = self
            .get(url, self.page_timeout)
            .send()
            .await?
            .error_for_status()?;
        let final_url = response.url().clone();
        let bytes = response.bytes().await?;
        debug!(bytes = bytes.len(), %final_url, "Fetched page");
        Ok(FetchedPage {
            url: final_url,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    #[instrument(level = "debug", skip_all, fields(%url, dest = %dest.display()))]
    async fn download(&self, url: &Url, dest: &Path) -> Result<u64, Box<dyn Error>> {
        let mut response = self
            .get(url, self.download_timeout)
            .send()
            .await?
            .error_for_status()?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!(bytes = written, "Downloaded file");
        Ok(written)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetcher`].
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    /// The underlying fetcher to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: Fetcher,
{
    /// Create a new retry wrapper around an existing [`Fetcher`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// let http = HttpFetcher::new(&settings.http)?;
    /// let fetcher = RetryFetch::new(http, 2, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(16) as u32;
        let mut delay = self.base_delay.saturating_mul(1 << shift);
        if delay > self.max_delay {
            delay = self.max_delay;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }

    async fn with_retries<R, F, Fut>(&self, op: &str, url: &Url, mut call: F) -> Result<R, Box<dyn Error>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, Box<dyn Error>>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match call().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            op,
                            %url,
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "Request exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        op,
                        %url,
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "Request failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Fetcher for RetryFetch<T>
where
    T: Fetcher,
{
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, Box<dyn Error>> {
        let inner = &self.inner;
        self.with_retries("fetch_page", url, move || inner.fetch_page(url))
            .await
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<u64, Box<dyn Error>> {
        let inner = &self.inner;
        self.with_retries("download", url, move || inner.download(url, dest))
            .await
    }
}
