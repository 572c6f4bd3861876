//! The daily fetch-and-merge job.
//!
//! One run discovers the edition's PDF links, downloads them one at a time
//! with a randomized pause between requests, keeps only the files that open
//! as PDFs, merges those in page order, and removes the per-page files.
//!
//! ```text
//! output_dir/
//! ├── rmrb-2025-10-19-p01.pdf   (removed after merge)
//! ├── rmrb-2025-10-19-p02.pdf   (removed after merge)
//! └── rmrb-2025-10-19-full.pdf
//! ```

use crate::config::PaperSettings;
use crate::fetch::Fetcher;
use crate::models::{DownloadedFile, Edition, RunReport};
use crate::pdf;
use crate::scrapers;
use crate::utils::{ensure_writable_dir, jitter_delay};
use chrono::{Local, NaiveDate};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::task;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Run synchronous PDF work on the blocking pool.
///
/// A panic inside `work` surfaces as an error instead of unwinding into
/// the caller.
async fn blocking<T, F>(work: F) -> Result<T, Box<dyn Error>>
where
    F: FnOnce() -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    Ok(task::spawn_blocking(work).await??)
}

async fn validate_pdf(path: &Path) -> Result<usize, Box<dyn Error>> {
    let path = path.to_path_buf();
    blocking(move || pdf::validate(&path).map_err(|e| e.to_string())).await
}

async fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<usize, Box<dyn Error>> {
    let inputs = inputs.to_vec();
    let output = output.to_path_buf();
    blocking(move || pdf::merge(&inputs, &output).map_err(|e| e.to_string())).await
}

/// Download every page of `edition`, validate, merge and clean up.
///
/// Per-page failures are logged and skipped. The report is a success only
/// if at least one page made it into the merged file.
///
/// # Errors
///
/// Returns an error when the output directory is unusable or when writing
/// the merged file fails; per-page files are left in place in that case.
#[instrument(level = "info", skip_all, fields(date = %edition.date, links = edition.pdf_links.len()))]
pub async fn download_and_merge<F: Fetcher>(
    fetcher: &F,
    settings: &PaperSettings,
    edition: &Edition,
) -> Result<RunReport, Box<dyn Error>> {
    let mut report = RunReport::empty(edition.date, edition.pdf_links.len());
    if edition.pdf_links.is_empty() {
        warn!("No PDF links to download");
        return Ok(report);
    }

    ensure_writable_dir(&settings.output_dir).await?;

    let date_label = edition.date_label();
    let total = edition.pdf_links.len();
    for (i, link) in edition.pdf_links.iter().enumerate() {
        let page = i + 1;
        let path = settings.page_path(&date_label, page);
        info!(page, total, url = %link, "Downloading PDF");

        sleep(jitter_delay(settings.delay_min_ms, settings.delay_max_ms)).await;

        if let Err(e) = fetcher.download(link.url(), &path).await {
            error!(url = %link, error = %e, "PDF download failed");
            let _ = fs::remove_file(&path).await;
            continue;
        }

        match validate_pdf(&path).await {
            Ok(pages) => {
                info!(path = %path.display(), pages, "Saved PDF");
                report.files.push(DownloadedFile { path, valid: true });
            }
            Err(e) => {
                error!(path = %path.display(), url = %link, error = %e, "Downloaded file is not a valid PDF");
                match fs::remove_file(&path).await {
                    Ok(()) => info!(path = %path.display(), "Removed invalid file"),
                    Err(e) => error!(path = %path.display(), error = %e, "Failed to remove invalid file"),
                }
                report.files.push(DownloadedFile { path, valid: false });
            }
        }
    }

    let valid: Vec<PathBuf> = report
        .files
        .iter()
        .filter(|f| f.valid)
        .map(|f| f.path.clone())
        .collect();
    if valid.is_empty() {
        warn!("No PDF downloaded successfully");
        return Ok(report);
    }

    let merged_path = settings.merged_path(&date_label);
    let pages = merge_pdfs(&valid, &merged_path).await?;
    info!(path = %merged_path.display(), files = valid.len(), pages, "Merged edition saved");

    for path in &valid {
        match fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "Removed page file"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to remove page file"),
        }
    }

    report.merged = Some(merged_path);
    Ok(report)
}

/// Discover and merge the edition as of `today`.
pub async fn run_for_date<F: Fetcher>(
    fetcher: &F,
    settings: &PaperSettings,
    today: NaiveDate,
) -> Result<RunReport, Box<dyn Error>> {
    let root = settings.root()?;
    let edition = scrapers::paper::discover_edition(fetcher, &root, today).await;
    download_and_merge(fetcher, settings, &edition).await
}

/// One scheduled run of the daily job.
#[instrument(level = "info", skip_all)]
pub async fn run_once<F: Fetcher>(fetcher: &F, settings: &PaperSettings) -> Result<RunReport, Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    info!("Starting daily edition download");

    let report = run_for_date(fetcher, settings, Local::now().date_naive()).await?;

    let elapsed = start_time.elapsed();
    if let Some(merged) = &report.merged {
        info!(
            date = %report.date,
            discovered = report.discovered,
            merged_files = report.valid_count(),
            path = %merged.display(),
            secs = elapsed.as_secs(),
            "Daily edition download complete"
        );
    } else {
        warn!(
            date = %report.date,
            discovered = report.discovered,
            secs = elapsed.as_secs(),
            "Daily edition download did not complete"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeFetcher;
    use crate::models::PdfLink;
    use crate::pdf::fixtures::sample_pdf;
    use crate::scrapers::paper::fixtures::{front_page, layout_page};
    use lopdf::Document;
    use url::Url;

    const ROOT: &str = "https://paper.people.com.cn/rmrb/";

    fn settings(dir: &std::path::Path) -> PaperSettings {
        PaperSettings {
            output_dir: dir.to_path_buf(),
            delay_min_ms: 0,
            delay_max_ms: 0,
            ..PaperSettings::default()
        }
    }

    fn link(name: &str) -> PdfLink {
        PdfLink::new(Url::parse(&format!("https://paper.people.com.cn/rmrb/pc/attachement/202510/19/{name}")).unwrap())
            .unwrap()
    }

    fn edition(names: &[&str]) -> Edition {
        Edition {
            date: NaiveDate::from_ymd_opt(2025, 10, 19).unwrap(),
            pdf_links: names.iter().map(|n| link(n)).collect(),
        }
    }

    fn dir_entries(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_merge_includes_only_valid_pdfs() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new()
            .with_file(link("p1.pdf").url().as_str(), sample_pdf(1))
            .with_file(link("p2.pdf").url().as_str(), b"<html>blocked</html>".to_vec())
            .with_file(link("p3.pdf").url().as_str(), sample_pdf(2));

        let report = download_and_merge(&fetcher, &settings(tmp.path()), &edition(&["p1.pdf", "p2.pdf", "p3.pdf"]))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.discovered, 3);
        assert_eq!(report.valid_count(), 2);
        assert_eq!(
            report.files.iter().map(|f| f.valid).collect::<Vec<_>>(),
            vec![true, false, true]
        );

        let merged = report.merged.unwrap();
        assert_eq!(merged, tmp.path().join("rmrb-2025-10-19-full.pdf"));
        assert_eq!(Document::load(&merged).unwrap().get_pages().len(), 3);
        assert_eq!(dir_entries(tmp.path()), vec!["rmrb-2025-10-19-full.pdf"]);
    }

    #[tokio::test]
    async fn test_pdf_work_runs_off_the_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.pdf");
        let bad = tmp.path().join("bad.pdf");
        std::fs::write(&good, sample_pdf(2)).unwrap();
        std::fs::write(&bad, b"<html>blocked</html>").unwrap();

        assert_eq!(validate_pdf(&good).await.unwrap(), 2);
        assert!(validate_pdf(&bad).await.is_err());

        let out = tmp.path().join("full.pdf");
        assert_eq!(merge_pdfs(&[good.clone(), good], &out).await.unwrap(), 4);
        assert!(merge_pdfs(&[], &tmp.path().join("none.pdf")).await.is_err());
    }

    #[tokio::test]
    async fn test_panicking_pdf_work_becomes_error() {
        let result: Result<usize, _> = blocking(|| panic!("unbalanced xref")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_no_links_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let fetcher = FakeFetcher::new();

        let report = download_and_merge(&fetcher, &settings(&out), &edition(&[])).await.unwrap();

        assert!(!report.is_success());
        assert!(report.files.is_empty());
        assert!(!out.exists());
        assert!(fetcher.requests.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_all_downloads_failing_reports_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new().with_file(link("p2.pdf").url().as_str(), b"garbage".to_vec());

        let report = download_and_merge(&fetcher, &settings(tmp.path()), &edition(&["p1.pdf", "p2.pdf"]))
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.files.len(), 1);
        assert!(!report.files[0].valid);
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_run_for_date_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = "https://paper.people.com.cn/rmrb/pc/layout/202510/19/";
        let fetcher = FakeFetcher::new()
            .with_page(ROOT, &front_page("2025年10月19日 星期日", 2))
            .with_page(&format!("{layout}node_01.html"), &layout_page("../../../attachement/202510/19/p1.pdf"))
            .with_page(&format!("{layout}node_02.html"), &layout_page("../../../attachement/202510/19/p2.pdf"))
            .with_file(link("p1.pdf").url().as_str(), sample_pdf(1))
            .with_file(link("p2.pdf").url().as_str(), sample_pdf(1));

        let today = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
        let report = run_for_date(&fetcher, &settings(tmp.path()), today).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.date, NaiveDate::from_ymd_opt(2025, 10, 19).unwrap());
        let merged = report.merged.unwrap();
        assert_eq!(Document::load(&merged).unwrap().get_pages().len(), 2);
    }

    #[tokio::test]
    async fn test_run_for_date_unreachable_site() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new();
        let today = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();

        let report = run_for_date(&fetcher, &settings(tmp.path()), today).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.date, today);
        assert_eq!(report.discovered, 0);
    }
}
