use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Files handed to a comparison engine. Paths are absolute or relative to the
/// current directory; display names are derived relative to `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct ComparisonInput {
    pub base_dir: PathBuf,
    pub baseline: Vec<PathBuf>,
    pub candidates: Vec<PathBuf>,
}

impl ComparisonInput {
    /// Name a file is known by in the report: its path below `base_dir`,
    /// with spaces replaced and forward slashes only.
    pub fn display_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);
        relative
            .to_string_lossy()
            .replace(' ', "_")
            .replace('\\', "/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareOptions {
    pub language: String,
    /// Passages appearing in more than this many files are ignored (`-m`).
    pub ignore_limit: u32,
    /// Number of matching file pairs shown in the report (`-n`).
    pub max_matches_shown: u32,
    /// Treat each student directory as one submission (`-d`).
    pub directory_mode: bool,
    pub experimental: bool,
    pub comment: String,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            language: "java".to_string(),
            ignore_limit: 4,
            max_matches_shown: 250,
            directory_mode: true,
            experimental: false,
            comment: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("No submissions to compare")]
    NoCandidates,

    #[error("Language '{0}' was not accepted by the MOSS server")]
    LanguageRejected(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Comparison engine failed: {0}")]
    EngineFailed(String),

    #[error("No report URL in engine response: {0:?}")]
    NoReportUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A similarity-detection engine. Implementations must not modify the input files.
#[async_trait]
pub trait Comparator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Submit the input and return the report locator (URL or path).
    async fn compare(
        &self,
        input: &ComparisonInput,
        options: &CompareOptions,
    ) -> Result<String, CompareError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_relative_to_base() {
        let input = ComparisonInput {
            base_dir: PathBuf::from("/tmp/out/repos/hw1"),
            ..ComparisonInput::default()
        };
        assert_eq!(
            input.display_name(Path::new("/tmp/out/repos/hw1/students/alice/A.java")),
            "students/alice/A.java"
        );
        assert_eq!(
            input.display_name(Path::new("/elsewhere/My File.java")),
            "/elsewhere/My_File.java"
        );
    }

    #[test]
    fn test_default_options() {
        let options = CompareOptions::default();
        assert_eq!(options.language, "java");
        assert_eq!(options.ignore_limit, 4);
        assert_eq!(options.max_matches_shown, 250);
        assert!(options.directory_mode);
    }
}
