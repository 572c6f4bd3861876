//! JSON output for the article scrape.
//!
//! Writes every scraped article as one pretty-printed array:
//!
//! ```json
//! [{ "title": "...", "url": "https://...", "body": "..." }]
//! ```

use crate::models::ArticleText;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `articles` to `path`, creating parent directories as needed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = articles.len()))]
pub async fn write_articles(articles: &[ArticleText], path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(articles)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!("Wrote articles JSON");
    Ok(())
}
