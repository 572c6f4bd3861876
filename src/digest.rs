//! Listing-to-text scrape: one listing page in, one text file out.
//!
//! Articles are fetched strictly in listing order and each one is written
//! as soon as it arrives. The first network or parse error aborts the run.

use crate::config::ArticleSettings;
use crate::fetch::Fetcher;
use crate::models::ArticleText;
use crate::outputs::{json, text::TextWriter};
use crate::scrapers::articles::{fetch_article, index_articles};
use std::error::Error;
use tracing::{info, instrument};
use url::Url;

/// Scrape `listing_url` into `settings.output` (and the JSON file, if set).
#[instrument(level = "info", skip_all, fields(listing = %listing_url))]
pub async fn run<F: Fetcher>(
    fetcher: &F,
    settings: &ArticleSettings,
    listing_url: &Url,
) -> Result<Vec<ArticleText>, Box<dyn Error>> {
    let links = index_articles(fetcher, listing_url).await?;
    info!(count = links.len(), "Found articles");

    let mut writer = TextWriter::create(&settings.output).await?;
    let mut articles = Vec::with_capacity(links.len());
    for (i, link) in links.iter().enumerate() {
        info!(index = i + 1, total = links.len(), title = %link.title, "Downloading article");
        let article = fetch_article(fetcher, link).await?;
        writer.append(&article).await?;
        articles.push(article);
    }
    info!(
        sections = writer.sections(),
        path = %writer.path().display(),
        "All articles saved"
    );

    if let Some(json_path) = &settings.json_output {
        json::write_articles(&articles, json_path).await?;
    }
    Ok(articles)
}
