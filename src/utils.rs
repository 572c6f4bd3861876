//! Utility functions for request identity, pacing, text handling, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - User-Agent rotation and randomized pacing between requests
//! - Text collection from parsed HTML elements
//! - String truncation for logging
//! - File system validation for output directories

use rand::seq::IndexedRandom;
use rand::{Rng, rng};
use scraper::ElementRef;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

/// Fallback identity used when the configured list is empty.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36";

/// Pick a User-Agent at random for the next request.
pub fn pick_user_agent(agents: &[String]) -> &str {
    agents
        .choose(&mut rng())
        .map(String::as_str)
        .unwrap_or(DEFAULT_USER_AGENT)
}

/// Random pause in `[min_ms, max_ms]` milliseconds.
///
/// Swapped bounds are tolerated; equal bounds give a fixed delay.
pub fn jitter_delay(min_ms: u64, max_ms: u64) -> Duration {
    let (lo, hi) = if min_ms <= max_ms {
        (min_ms, max_ms)
    } else {
        (max_ms, min_ms)
    };
    if lo == hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rng().random_range(lo..=hi))
}

/// Collect the text nodes under `element`, trimmed, with empty nodes dropped.
///
/// # Examples
///
/// ```ignore
/// // <p> a <b>b</b> </p>
/// assert_eq!(collect_text(p, "\n"), "a\nb");
/// assert_eq!(collect_text(p, ""), "ab");
/// ```
pub fn collect_text(element: ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` characters with an ellipsis and the
/// number of dropped bytes appended. Cuts always land on a character
/// boundary, so CJK text is safe.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
