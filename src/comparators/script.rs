use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::traits::{CompareError, CompareOptions, Comparator, ComparisonInput};

/// Runs the `moss` submission script shipped by the MOSS authors.
pub struct MossScript {
    program: PathBuf,
}

impl MossScript {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The program to spawn. The script runs inside the repos directory, so a
    /// relative path like `./moss` is anchored to the caller's directory first;
    /// a bare name is still looked up on `PATH`.
    fn resolved_program(&self, cwd: &Path) -> PathBuf {
        if self.program.is_relative() && self.program.components().count() > 1 {
            cwd.join(&self.program)
        } else {
            self.program.clone()
        }
    }

    /// Command-line arguments for one run, with paths relative to `input.base_dir`.
    pub fn arguments(input: &ComparisonInput, options: &CompareOptions) -> Vec<String> {
        let mut args = vec![
            "-l".to_string(),
            options.language.clone(),
            "-m".to_string(),
            options.ignore_limit.to_string(),
            "-n".to_string(),
            options.max_matches_shown.to_string(),
        ];
        if options.directory_mode {
            args.push("-d".to_string());
        }
        if options.experimental {
            args.push("-x".to_string());
        }
        if !options.comment.is_empty() {
            args.push("-c".to_string());
            args.push(options.comment.clone());
        }
        for base in &input.baseline {
            args.push("-b".to_string());
            args.push(input.display_name(base));
        }
        args.extend(input.candidates.iter().map(|p| input.display_name(p)));
        args
    }
}

/// The report URL is the last line of output that looks like one.
fn report_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("http://") || l.starts_with("https://"))
        .last()
        .map(str::to_string)
}

#[async_trait]
impl Comparator for MossScript {
    fn name(&self) -> &'static str {
        "MOSS script"
    }

    async fn compare(
        &self,
        input: &ComparisonInput,
        options: &CompareOptions,
    ) -> Result<String, CompareError> {
        if input.candidates.is_empty() {
            return Err(CompareError::NoCandidates);
        }
        let args = Self::arguments(input, options);
        tracing::info!(program = %self.program.display(), files = args.len(), "running moss script");

        let cwd = std::env::current_dir().map_err(CompareError::Io)?;
        let output = match Command::new(self.resolved_program(&cwd))
            .args(&args)
            .current_dir(&input.base_dir)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CompareError::ToolNotFound(
                    self.program.display().to_string(),
                ))
            }
            Err(e) => return Err(CompareError::Io(e)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompareError::EngineFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        report_url(&stdout).ok_or_else(|| CompareError::NoReportUrl(stdout.trim().to_string()))
    }
}
