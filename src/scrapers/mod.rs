//! Scrapers for the newspaper's web edition.
//!
//! Each scraper follows the same two-phase pattern as the rest of the
//! crate: pure parsing functions that take an already parsed
//! [`scraper::Html`] document (easy to test against fixtures), and thin
//! async wrappers that fetch pages through a [`crate::fetch::Fetcher`].
//!
//! # Sources
//!
//! | Module | Page | Yields |
//! |--------|------|--------|
//! | [`paper`] | Front page and per-page layout pages | Edition date, PDF links |
//! | [`articles`] | Article listing and article pages | Titles, URLs, body text |

pub mod articles;
pub mod paper;

use url::Url;

/// Resolve `href` against `base`, skipping empty or unparsable values.
pub(crate) fn resolve_href(base: &Url, href: Option<&str>) -> Option<Url> {
    let href = href?.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok()
}
