//! Article listing scraper.
//!
//! A layout page lists the page's articles in a `ul.news-list`; each
//! article page carries its body in `div.article-content` (current
//! layout) or `div#articleContent` (older layout).

use super::resolve_href;
use crate::fetch::Fetcher;
use crate::models::{ArticleLink, ArticleText};
use crate::utils::{collect_text, truncate_for_log};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::error::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

static LISTING_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("ul.news-list").unwrap());
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static CONTENT_SELECTORS: Lazy<[Selector; 2]> = Lazy::new(|| {
    [
        Selector::parse("div.article-content").unwrap(),
        Selector::parse("div#articleContent").unwrap(),
    ]
});

/// Extract (title, absolute URL) pairs from the listing's `ul.news-list`.
///
/// Anchors without an `href` are skipped. A page without the list is an
/// error, since it usually means the layout changed.
pub fn parse_listing(document: &Html, base: &Url) -> Result<Vec<ArticleLink>, Box<dyn Error>> {
    let list = document
        .select(&LISTING_SELECTOR)
        .next()
        .ok_or_else(|| format!("no ul.news-list on listing page {base}"))?;

    let links = list
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| {
            let url = resolve_href(base, anchor.value().attr("href"))?;
            Some(ArticleLink {
                title: collect_text(anchor, ""),
                url: url.to_string(),
            })
        })
        .collect();
    Ok(links)
}

/// Body text of an article page, or `None` if no content container exists.
///
/// The containers are tried in order and the first one present wins.
pub fn extract_article_body(document: &Html) -> Option<String> {
    CONTENT_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next())
        .map(|content| collect_text(content, "\n"))
}

/// Fetch the listing page and return its article links.
#[instrument(level = "info", skip_all, fields(url = %listing_url))]
pub async fn index_articles<F: Fetcher>(fetcher: &F, listing_url: &Url) -> Result<Vec<ArticleLink>, Box<dyn Error>> {
    let page = fetcher.fetch_page(listing_url).await?;
    let document = Html::parse_document(&page.body);
    let links = parse_listing(&document, &page.url)?;

    info!(count = links.len(), source = %listing_url, "Indexed article URLs");
    debug!(links = ?links, "Article links");
    Ok(links)
}

/// Fetch a single article and extract its body.
#[instrument(level = "info", skip_all, fields(url = %link.url))]
pub async fn fetch_article<F: Fetcher>(fetcher: &F, link: &ArticleLink) -> Result<ArticleText, Box<dyn Error>> {
    let url = Url::parse(&link.url)?;
    let page = fetcher.fetch_page(&url).await?;
    let document = Html::parse_document(&page.body);

    let body = match extract_article_body(&document) {
        Some(body) => body,
        None => {
            warn!(title = %link.title, "No content container; writing empty body");
            String::new()
        }
    };
    info!(bytes = body.len(), preview = %truncate_for_log(&body, 40), "Parsed article");

    Ok(ArticleText {
        link: link.clone(),
        body,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Listing page with one anchor per `(title, href)`.
    pub fn listing_page(entries: &[(&str, &str)]) -> String {
        let items: String = entries
            .iter()
            .map(|(title, href)| format!("<li><a href=\"{href}\">\n  {title}\n</a></li>"))
            .collect();
        format!(
            "<html><body><div class=\"news\"><ul class=\"news-list\">{items}</ul></div>\
             <ul class=\"other\"><li><a href=\"elsewhere.html\">Elsewhere</a></li></ul></body></html>"
        )
    }

    /// Article page with paragraphs inside `div.article-content`.
    pub fn article_page(paragraphs: &[&str]) -> String {
        let body: String = paragraphs.iter().map(|p| format!("<p>  {p}  </p>\n")).collect();
        format!("<html><body><h1>headline</h1><div class=\"article-content\">{body}</div></body></html>")
    }
}
