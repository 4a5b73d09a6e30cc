use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::comparators::traits::ComparisonInput;
use crate::utils::fs::{find_submission_files, list_files, remove_dir_if_exists};

/// On-disk tree for one project:
/// `<root>/repos/<project>/{starter,students/<login>}` and `<root>/outs/<project>`.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    project: String,
}

impl Workspace {
    pub fn new(root: &Path, project: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            project: project.to_string(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.root.join("repos").join(&self.project)
    }

    pub fn starter_dir(&self) -> PathBuf {
        self.repos_dir().join("starter")
    }

    pub fn students_dir(&self) -> PathBuf {
        self.repos_dir().join("students")
    }

    pub fn student_dir(&self, student: &str) -> PathBuf {
        self.students_dir().join(student)
    }

    pub fn outs_dir(&self) -> PathBuf {
        self.root.join("outs").join(&self.project)
    }

    /// Create the project directories. Existing content is left alone.
    pub fn setup(&self) -> Result<()> {
        for dir in [self.starter_dir(), self.students_dir(), self.outs_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        tracing::debug!(project = %self.project, root = %self.root.display(), "workspace ready");
        Ok(())
    }

    /// Remove the project's repos and outputs. Absent directories are fine.
    pub fn cleanup(&self) -> Result<()> {
        self.cleanup_repos()?;
        let outs = self.outs_dir();
        remove_dir_if_exists(&outs)
            .with_context(|| format!("Failed to remove {}", outs.display()))?;
        Ok(())
    }

    /// Remove only the downloaded repositories, keeping saved reports.
    pub fn cleanup_repos(&self) -> Result<()> {
        let repos = self.repos_dir();
        if remove_dir_if_exists(&repos)
            .with_context(|| format!("Failed to remove {}", repos.display()))?
        {
            tracing::debug!(path = %repos.display(), "removed");
        }
        Ok(())
    }

    /// Drop files left in the starter directory by an earlier run.
    pub fn clear_starter(&self) -> Result<()> {
        let dir = self.starter_dir();
        remove_dir_if_exists(&dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(())
    }

    /// Drop a student's directory; it is recreated only when files are written.
    pub fn clear_student(&self, student: &str) -> Result<()> {
        if !is_plain_name(student) {
            bail!("Invalid student name: {}", student);
        }
        let dir = self.student_dir(student);
        remove_dir_if_exists(&dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
        Ok(())
    }

    /// Write `content` as `filename` under the starter directory, or under the
    /// student's directory when `student` is given.
    pub fn materialize_file(
        &self,
        student: Option<&str>,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf> {
        if !is_plain_name(filename) {
            bail!("Refusing to write file with path components: {}", filename);
        }
        let dir = match student {
            Some(login) => {
                if !is_plain_name(login) {
                    bail!("Invalid student name: {}", login);
                }
                self.student_dir(login)
            }
            None => self.starter_dir(),
        };
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(filename);
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Snapshot of the files handed to a comparison engine.
    pub fn comparison_input(&self) -> ComparisonInput {
        ComparisonInput {
            base_dir: self.repos_dir(),
            baseline: list_files(&self.starter_dir()),
            candidates: find_submission_files(&self.students_dir()),
        }
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}
