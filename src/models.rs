//! Data models for the daily edition and its articles.
//!
//! This module defines the transient structures passed between the
//! scrapers, the download/merge workflow, and the output writers:
//! - [`PdfLink`]: A URL known to point at a `.pdf` resource
//! - [`Edition`]: The edition date plus its discovered PDF links
//! - [`DownloadedFile`]: A per-page PDF on disk and whether it opened as a PDF
//! - [`RunReport`]: The outcome of one fetch-and-merge run
//! - [`ArticleLink`] / [`ArticleText`]: Listing entries and their extracted bodies

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// A link to a single page PDF of the printed edition.
///
/// A `PdfLink` can only be built from a URL whose path ends in `.pdf`,
/// so everything downstream of discovery can assume the suffix holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfLink {
    url: Url,
}

impl PdfLink {
    /// Wrap `url` if its path names a `.pdf` resource.
    pub fn new(url: Url) -> Option<Self> {
        if url.path().ends_with(".pdf") {
            Some(Self { url })
        } else {
            None
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for PdfLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// One day's edition as discovered from the newspaper's front page.
#[derive(Debug, Clone)]
pub struct Edition {
    /// Edition date, parsed from the page or falling back to today.
    pub date: NaiveDate,
    /// PDF links in page order.
    pub pdf_links: Vec<PdfLink>,
}

impl Edition {
    /// The date as used in file names: `YYYY-MM-DD`.
    pub fn date_label(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// A per-page PDF written to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    /// `true` once the file has been opened successfully as a PDF.
    pub valid: bool,
}

/// Outcome of a single fetch-and-merge run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub date: NaiveDate,
    /// Number of PDF links discovered for the edition.
    pub discovered: usize,
    /// Every file that finished downloading, valid or not.
    pub files: Vec<DownloadedFile>,
    /// The merged edition, present only if at least one page was merged.
    pub merged: Option<PathBuf>,
}

impl RunReport {
    pub fn empty(date: NaiveDate, discovered: usize) -> Self {
        Self {
            date,
            discovered,
            files: Vec::new(),
            merged: None,
        }
    }

    /// A run succeeds iff it produced a merged file.
    pub fn is_success(&self) -> bool {
        self.merged.is_some()
    }

    pub fn valid_count(&self) -> usize {
        self.files.iter().filter(|f| f.valid).count()
    }
}

/// An entry of the article listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleLink {
    pub title: String,
    /// Absolute article URL.
    pub url: String,
}

/// The plain-text body extracted for an [`ArticleLink`].
#[derive(Debug, Clone, Serialize)]
pub struct ArticleText {
    #[serde(flatten)]
    pub link: ArticleLink,
    /// Body text; empty when the page has no recognized content container.
    pub body: String,
}
