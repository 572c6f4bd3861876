//! Plain-text output for the article scrape.
//!
//! The file is truncated when opened and each article is appended and
//! flushed as soon as it is fetched, so a failure part-way leaves every
//! article up to that point on disk.

use crate::models::ArticleText;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Width of the `=` line closing each section.
pub const SEPARATOR_WIDTH: usize = 60;

/// Render one article as `【title】`, blank line, body, blank line, separator.
pub fn format_section(title: &str, body: &str) -> String {
    format!("【{title}】\n\n{body}\n\n{}\n\n", "=".repeat(SEPARATOR_WIDTH))
}

/// Appending writer for the concatenated article file.
#[derive(Debug)]
pub struct TextWriter {
    path: PathBuf,
    file: File,
    sections: usize,
}

impl TextWriter {
    /// Create (or truncate) the output file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn create(path: &Path) -> Result<Self, Box<dyn Error>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(path).await?;
        info!("Opened text output");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            sections: 0,
        })
    }

    /// Append one article section and flush it to disk.
    pub async fn append(&mut self, article: &ArticleText) -> Result<(), Box<dyn Error>> {
        let section = format_section(&article.link.title, &article.body);
        self.file.write_all(section.as_bytes()).await?;
        self.file.flush().await?;
        self.sections += 1;
        debug!(sections = self.sections, title = %article.link.title, "Appended article");
        Ok(())
    }

    pub fn sections(&self) -> usize {
        self.sections
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
