pub mod download;

use anyhow::Result;
use std::path::{Path, PathBuf};

use download::{download_report, PageFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Download,
    Open,
    Print,
}

#[derive(Debug)]
pub enum ReportOutcome {
    Saved { index: PathBuf, pages: usize },
    Opened,
    Printed,
}

/// Obtain the report at `locator` according to `mode`.
///
/// Download errors are returned to the caller; they never trigger a new comparison.
pub async fn obtain_report(
    locator: &str,
    destination: &Path,
    mode: ReportMode,
    fetcher: &dyn PageFetcher,
) -> Result<ReportOutcome> {
    match mode {
        ReportMode::Download => {
            let saved = download_report(fetcher, locator, destination).await?;
            let index = saved
                .first()
                .cloned()
                .unwrap_or_else(|| destination.join(download::INDEX_FILE));
            Ok(ReportOutcome::Saved {
                index,
                pages: saved.len(),
            })
        }
        ReportMode::Open => match open::that(locator) {
            Ok(()) => Ok(ReportOutcome::Opened),
            Err(e) => {
                tracing::warn!(error = %e, "could not open a browser");
                Ok(ReportOutcome::Printed)
            }
        },
        ReportMode::Print => Ok(ReportOutcome::Printed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Unreachable;

    #[async_trait]
    impl PageFetcher for Unreachable {
        async fn fetch(&self, url: &str) -> Result<String> {
            bail!("network is down, cannot fetch {}", url)
        }
    }

    struct Single;

    #[async_trait]
    impl PageFetcher for Single {
        async fn fetch(&self, _url: &str) -> Result<String> {
            Ok("<html>no matches</html>".to_string())
        }
    }

    #[tokio::test]
    async fn test_print_mode_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("outs/hw1");
        let outcome = obtain_report("http://moss/results/1", &dest, ReportMode::Print, &Unreachable)
            .await
            .unwrap();
        assert!(matches!(outcome, ReportOutcome::Printed));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_mode_saves_index() {
        let tmp = TempDir::new().unwrap();
        let outcome = obtain_report("http://moss/results/1", tmp.path(), ReportMode::Download, &Single)
            .await
            .unwrap();
        match outcome {
            ReportOutcome::Saved { index, pages } => {
                assert_eq!(index, tmp.path().join("report.html"));
                assert_eq!(pages, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_error_surfaces() {
        let tmp = TempDir::new().unwrap();
        let result = obtain_report(
            "http://moss/results/1",
            tmp.path(),
            ReportMode::Download,
            &Unreachable,
        )
        .await;
        assert!(result.is_err());
    }
}
