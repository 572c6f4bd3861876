//! Front-page scraper for the printed edition's PDF pages.
//!
//! The front page carries the edition date in a `.date` element
//! (`2025年10月19日 星期日`) and one `#pageLink` anchor per printed page.
//! Each page's layout view links its PDF from the `.paper-bot` footer.
//!
//! # URL Pattern
//!
//! ```text
//! https://paper.people.com.cn/rmrb/pc/layout/202510/19/node_01.html
//! https://paper.people.com.cn/rmrb/pc/attachement/202510/19/<hash>.pdf
//! ```

use super::resolve_href;
use crate::fetch::Fetcher;
use crate::models::{Edition, PdfLink};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

static DATE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".date").unwrap());
static PAGE_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("#pageLink").unwrap());
static PDF_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".paper-bot a").unwrap());
static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})年(\d{2})月(\d{2})日").unwrap());

/// Parse the edition date out of `text`, e.g. `2025年10月19日 星期日`.
///
/// Returns `None` if the pattern is absent or names an impossible date.
pub fn parse_edition_date(text: &str) -> Option<NaiveDate> {
    let caps = DATE_PATTERN.captures(text)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// The edition date shown on the page, or `today` when it cannot be read.
pub fn resolve_edition_date(document: &Html, today: NaiveDate) -> NaiveDate {
    let Some(element) = document.select(&DATE_SELECTOR).next() else {
        warn!(%today, "Date element not found; using current date");
        return today;
    };
    let text = element.text().collect::<String>();
    match parse_edition_date(&text) {
        Some(date) => {
            info!(%date, "Edition date read from page");
            date
        }
        None => {
            warn!(text = %text.trim(), %today, "Date format did not match; using current date");
            today
        }
    }
}

/// Absolute URLs of every page link, in page order, without duplicates.
pub fn extract_page_links(document: &Html, base: &Url) -> Vec<Url> {
    document
        .select(&PAGE_LINK_SELECTOR)
        .filter_map(|element| resolve_href(base, element.value().attr("href")))
        .unique()
        .collect()
}

/// The PDF linked from a page's footer, if it points at a `.pdf` resource.
pub fn extract_pdf_link(document: &Html, base: &Url) -> Option<PdfLink> {
    let Some(element) = document.select(&PDF_LINK_SELECTOR).next() else {
        warn!(page = %base, "No PDF link on page");
        return None;
    };
    let href = element.value().attr("href");
    let link = resolve_href(base, href).and_then(PdfLink::new);
    if link.is_none() {
        warn!(page = %base, href = ?href, "Invalid PDF link");
    }
    link
}

/// Load the front page and return the edition date plus its page URLs.
///
/// A failed front-page load is logged and yields `today` with no pages.
#[instrument(level = "info", skip_all, fields(root = %root, %today))]
pub async fn index_pages<F: Fetcher>(fetcher: &F, root: &Url, today: NaiveDate) -> (NaiveDate, Vec<Url>) {
    let page = match fetcher.fetch_page(root).await {
        Ok(page) => page,
        Err(e) => {
            error!(error = %e, url = %root, "Failed to load front page");
            return (today, Vec::new());
        }
    };

    let document = Html::parse_document(&page.body);
    let date = resolve_edition_date(&document, today);
    let pages = extract_page_links(&document, &page.url);

    if pages.is_empty() {
        warn!(url = %page.url, "No page links found");
    } else {
        info!(count = pages.len(), %date, "Indexed edition pages");
    }
    debug!(urls = ?pages.iter().map(Url::as_str).collect::<Vec<_>>(), "Page URLs");
    (date, pages)
}

/// Visit each page in order and collect one PDF link per page.
///
/// Pages that fail to load or have no valid PDF link are logged and skipped.
#[instrument(level = "info", skip_all, fields(pages = pages.len()))]
pub async fn fetch_pdf_links<F: Fetcher>(fetcher: &F, pages: Vec<Url>) -> Vec<PdfLink> {
    let total = pages.len();
    let links: Vec<PdfLink> = stream::iter(pages.into_iter().enumerate())
        .then(|(i, url)| async move {
            info!(index = i + 1, total, %url, "Processing page");
            match fetcher.fetch_page(&url).await {
                Ok(page) => {
                    let document = Html::parse_document(&page.body);
                    let link = extract_pdf_link(&document, &page.url);
                    if let Some(link) = &link {
                        info!(%link, "Found PDF link");
                    }
                    link
                }
                Err(e) => {
                    error!(error = %e, %url, "Failed to load page");
                    None
                }
            }
        })
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(count = links.len(), total, "Collected PDF links");
    links
}

/// Discover today's edition: its date and the PDF link of every page.
pub async fn discover_edition<F: Fetcher>(fetcher: &F, root: &Url, today: NaiveDate) -> Edition {
    let (date, pages) = index_pages(fetcher, root, today).await;
    let pdf_links = if pages.is_empty() {
        Vec::new()
    } else {
        fetch_pdf_links(fetcher, pages).await
    };
    Edition { date, pdf_links }
}
