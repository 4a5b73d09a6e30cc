use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cli::progress::CollectProgress;
use crate::core::workspace::Workspace;
use crate::forge::traits::{FileRef, RepoHandle};
use crate::forge::{Forge, ForgeError};
use crate::utils::fs::is_source_file;

const STARTER_SUFFIX: &str = "starter";

/// How a single student's submission ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentOutcome {
    /// Files written to the student's directory
    Collected(usize),
    /// No repository, an empty repository (HTTP 409), or no source files
    EmptyOrNoRepo,
    /// Nothing committed at or before the deadline
    NoValidCommit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectSummary {
    pub collected: usize,
    pub empty_or_no_repo: usize,
    pub no_valid_commit: usize,
    pub outcomes: Vec<(String, StudentOutcome)>,
}

impl CollectSummary {
    fn record(&mut self, student: &str, outcome: StudentOutcome) {
        match outcome {
            StudentOutcome::Collected(_) => self.collected += 1,
            StudentOutcome::EmptyOrNoRepo => self.empty_or_no_repo += 1,
            StudentOutcome::NoValidCommit => self.no_valid_commit += 1,
        }
        self.outcomes.push((student.to_string(), outcome));
    }
}

/// A fatal collection error. The project workspace has already been removed
/// when one of these is returned.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Starter repository {repo} is unavailable: {source}")]
    Starter {
        repo: String,
        #[source]
        source: ForgeError,
    },

    #[error("Could not list members of {org}: {source}")]
    Members {
        org: String,
        #[source]
        source: ForgeError,
    },

    #[error("Could not get {student}: {source}")]
    Student {
        student: String,
        #[source]
        source: ForgeError,
    },

    #[error(transparent)]
    Workspace(#[from] anyhow::Error),
}

impl CollectError {
    /// True for credential problems, which no amount of re-running fixes.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            CollectError::Starter { source: ForgeError::Unauthorized(_), .. }
                | CollectError::Members { source: ForgeError::Unauthorized(_), .. }
                | CollectError::Student { source: ForgeError::Unauthorized(_), .. }
        )
    }
}

pub struct Collector<'a> {
    forge: &'a dyn Forge,
    workspace: &'a Workspace,
    org: String,
    source_path: String,
    exclude: Vec<String>,
    progress: CollectProgress,
}

impl<'a> Collector<'a> {
    pub fn new(forge: &'a dyn Forge, workspace: &'a Workspace, org: &str, source_path: &str) -> Self {
        Self {
            forge,
            workspace,
            org: org.to_string(),
            source_path: source_path.to_string(),
            exclude: Vec::new(),
            progress: CollectProgress::hidden(),
        }
    }

    /// Logins that are never treated as students (course staff, bots).
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_progress(mut self, progress: CollectProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn starter_repo_name(&self) -> String {
        format!("{}-{}", self.workspace.project(), STARTER_SUFFIX)
    }

    pub fn student_repo_name(&self, student: &str) -> String {
        format!("{}-{}", self.workspace.project(), student)
    }

    /// Download the starter sources. Every failure is fatal.
    pub async fn collect_starter(&self) -> Result<usize, CollectError> {
        let name = self.starter_repo_name();
        let starter_error = |source: ForgeError| CollectError::Starter {
            repo: format!("{}/{}", self.org, name),
            source,
        };

        let result = async {
            let repo = self
                .forge
                .find_repository(&self.org, &name)
                .await
                .map_err(starter_error)?;
            let revision = repo.default_branch.clone().unwrap_or_else(|| "HEAD".to_string());
            let files = self
                .source_files(&repo, &revision)
                .await
                .map_err(starter_error)?;

            self.workspace.clear_starter()?;
            self.progress.start("starter", files.len());
            let written = self
                .download(&repo, &files, None)
                .await
                .map_err(|e| match e {
                    DownloadError::Forge(source) => starter_error(source),
                    DownloadError::Workspace(e) => CollectError::Workspace(e),
                })?;
            self.progress.finish();
            Ok::<_, CollectError>(written)
        }
        .await;

        self.abort_on_error(result)
    }

    /// Download every student's sources as of `deadline`.
    ///
    /// Missing or empty repositories and students without a commit before the
    /// deadline are counted; anything else aborts the run.
    pub async fn collect_students(
        &self,
        deadline: DateTime<Utc>,
    ) -> Result<CollectSummary, CollectError> {
        let result = async {
            let members = self
                .forge
                .list_org_members(&self.org)
                .await
                .map_err(|source| CollectError::Members {
                    org: self.org.clone(),
                    source,
                })?;

            let students: Vec<String> = members
                .into_iter()
                .map(|m| m.login)
                .filter(|login| Some(login.as_str()) != self.forge.current_login())
                .filter(|login| !self.exclude.contains(login))
                // `<project>-starter` is the template, never a submission
                .filter(|login| login != STARTER_SUFFIX)
                .collect();
            tracing::info!(count = students.len(), org = %self.org, "collecting students");

            let mut summary = CollectSummary::default();
            for student in &students {
                let outcome = self.collect_student(student, deadline).await?;
                tracing::debug!(%student, ?outcome, "student done");
                summary.record(student, outcome);
            }
            self.progress.finish();
            Ok::<_, CollectError>(summary)
        }
        .await;

        self.abort_on_error(result)
    }

    async fn collect_student(
        &self,
        student: &str,
        deadline: DateTime<Utc>,
    ) -> Result<StudentOutcome, CollectError> {
        let fatal = |source: ForgeError| CollectError::Student {
            student: student.to_string(),
            source,
        };

        // a previous run may have left files behind
        self.workspace.clear_student(student)?;

        let repo = match self
            .forge
            .find_repository(&self.org, &self.student_repo_name(student))
            .await
        {
            Ok(repo) => repo,
            Err(e) if is_absent(&e) => return Ok(StudentOutcome::EmptyOrNoRepo),
            Err(e) => return Err(fatal(e)),
        };

        let commit = match self.forge.latest_commit_before(&repo, deadline).await {
            Ok(Some(commit)) => commit,
            Ok(None) => return Ok(StudentOutcome::NoValidCommit),
            Err(e) if is_absent(&e) => return Ok(StudentOutcome::EmptyOrNoRepo),
            Err(e) => return Err(fatal(e)),
        };

        let files = match self.source_files(&repo, &commit.sha).await {
            Ok(files) => files,
            Err(e) if is_absent(&e) => return Ok(StudentOutcome::EmptyOrNoRepo),
            Err(e) => return Err(fatal(e)),
        };
        if files.is_empty() {
            return Ok(StudentOutcome::EmptyOrNoRepo);
        }

        self.progress.start(student, files.len());
        let written = self
            .download(&repo, &files, Some(student))
            .await
            .map_err(|e| match e {
                DownloadError::Forge(source) => fatal(source),
                DownloadError::Workspace(e) => CollectError::Workspace(e),
            })?;
        Ok(StudentOutcome::Collected(written))
    }

    async fn source_files(&self, repo: &RepoHandle, revision: &str) -> Result<Vec<FileRef>, ForgeError> {
        let files = self
            .forge
            .list_files(repo, &self.source_path, revision)
            .await?;
        Ok(files.into_iter().filter(|f| is_source_file(&f.name)).collect())
    }

    async fn download(
        &self,
        repo: &RepoHandle,
        files: &[FileRef],
        student: Option<&str>,
    ) -> Result<usize, DownloadError> {
        for file in files {
            self.progress.set_message(&file.name);
            let content = self
                .forge
                .fetch_content(repo, file)
                .await
                .map_err(DownloadError::Forge)?;
            self.workspace
                .materialize_file(student, &file.name, &content)
                .map_err(DownloadError::Workspace)?;
            self.progress.inc();
        }
        Ok(files.len())
    }

    fn abort_on_error<T>(&self, result: Result<T, CollectError>) -> Result<T, CollectError> {
        if let Err(e) = &result {
            self.progress.finish();
            tracing::error!(error = %e, "collection failed, cleaning up");
            if let Err(cleanup) = self.workspace.cleanup() {
                tracing::warn!(error = %cleanup, "cleanup failed");
            }
        }
        result
    }
}

enum DownloadError {
    Forge(ForgeError),
    Workspace(anyhow::Error),
}

/// Expected "no submission" answers: missing repository or HTTP 409.
fn is_absent(e: &ForgeError) -> bool {
    matches!(e, ForgeError::NotFound(_) | ForgeError::Conflict(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::fake::{at, FakeForge, FakeRepo, SRC};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const ORG: &str = "ap";

    fn src(name: &str) -> String {
        format!("{}/{}", SRC, name)
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = crate::utils::fs::list_files(dir)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn starter() -> FakeRepo {
        FakeRepo::default().commit(
            "s1",
            at(1, 9),
            &[
                (&src("A.java"), "class A {}"),
                (&src("B.java"), "class B {}"),
                (&src("notes.md"), "# notes"),
                ("README.md", "readme"),
            ],
        )
    }

    fn hw1_forge() -> FakeForge {
        FakeForge::new()
            .member("student1")
            .member("student2")
            .member("student3")
            .repo("ap/hw1-starter", starter())
            .repo(
                "ap/hw1-student1",
                FakeRepo::default()
                    .commit("c1", at(10, 20), &[(&src("A.java"), "class A { int solved; }")])
                    .commit("c2", at(12, 1), &[(&src("A.java"), "class A { late; }")]),
            )
            .repo(
                "ap/hw1-student3",
                FakeRepo::default().commit("late", at(12, 8), &[(&src("A.java"), "class A {}")]),
            )
    }

    #[tokio::test]
    async fn test_end_to_end_hw1_scenario() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        ws.setup().unwrap();
        let forge = hw1_forge();
        let collector = Collector::new(&forge, &ws, ORG, SRC);

        assert_eq!(collector.collect_starter().await.unwrap(), 2);
        let summary = collector.collect_students(at(11, 23)).await.unwrap();

        assert_eq!(file_names(&ws.starter_dir()), vec!["A.java", "B.java"]);
        assert_eq!(file_names(&ws.student_dir("student1")), vec!["A.java"]);
        assert_eq!(
            fs::read_to_string(ws.student_dir("student1").join("A.java")).unwrap(),
            "class A { int solved; }"
        );
        assert!(!ws.student_dir("student2").exists());
        assert!(!ws.student_dir("student3").exists());

        assert_eq!(summary.empty_or_no_repo, 1);
        assert_eq!(summary.no_valid_commit, 1);
        assert_eq!(summary.collected, 1);
        assert_eq!(
            summary.outcomes,
            vec![
                ("student1".to_string(), StudentOutcome::Collected(1)),
                ("student2".to_string(), StudentOutcome::EmptyOrNoRepo),
                ("student3".to_string(), StudentOutcome::NoValidCommit),
            ]
        );
    }

    #[tokio::test]
    async fn test_commit_exactly_at_deadline_is_collected() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        let forge = FakeForge::new().member("alice").repo(
            "ap/hw1-alice",
            FakeRepo::default()
                .commit("edge", at(5, 12), &[(&src("A.java"), "on time")])
                .commit("after", at(5, 13), &[(&src("A.java"), "too late")]),
        );

        let summary = Collector::new(&forge, &ws, ORG, SRC)
            .collect_students(at(5, 12))
            .await
            .unwrap();

        assert_eq!(summary.collected, 1);
        assert_eq!(
            fs::read_to_string(ws.student_dir("alice").join("A.java")).unwrap(),
            "on time"
        );
    }

    #[tokio::test]
    async fn test_conflict_counts_as_empty() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        let forge = FakeForge::new()
            .member("empty")
            .member("conflict")
            .repo("ap/hw1-empty", FakeRepo::default())
            .repo("ap/hw1-conflict", FakeRepo::failing(409));

        let summary = Collector::new(&forge, &ws, ORG, SRC)
            .collect_students(at(5, 12))
            .await
            .unwrap();
        assert_eq!(summary.empty_or_no_repo, 2);
        assert_eq!(summary.no_valid_commit, 0);
    }

    #[tokio::test]
    async fn test_repo_without_sources_counts_as_empty() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        let forge = FakeForge::new().member("bob").repo(
            "ap/hw1-bob",
            FakeRepo::default().commit("c", at(1, 1), &[("README.md", "hi"), (&src("x.txt"), "x")]),
        );

        let summary = Collector::new(&forge, &ws, ORG, SRC)
            .collect_students(at(5, 12))
            .await
            .unwrap();
        assert_eq!(summary.outcomes, vec![("bob".to_string(), StudentOutcome::EmptyOrNoRepo)]);
        assert!(!ws.student_dir("bob").exists());
    }

    #[tokio::test]
    async fn test_unexpected_student_error_aborts_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        ws.setup().unwrap();
        let forge = FakeForge::new()
            .member("ok")
            .member("broken")
            .member("never-reached")
            .repo("ap/hw1-starter", starter())
            .repo(
                "ap/hw1-ok",
                FakeRepo::default().commit("c", at(1, 1), &[(&src("A.java"), "a")]),
            )
            .repo("ap/hw1-broken", FakeRepo::failing(502));
        let collector = Collector::new(&forge, &ws, ORG, SRC);
        collector.collect_starter().await.unwrap();

        let err = collector.collect_students(at(5, 12)).await.unwrap_err();

        assert!(matches!(
            &err,
            CollectError::Student { student, source: ForgeError::Service { status: 502, .. } }
                if student == "broken"
        ));
        assert!(!ws.repos_dir().exists());
        assert!(!ws.outs_dir().exists());
    }

    #[tokio::test]
    async fn test_auth_error_during_students_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        ws.setup().unwrap();
        let forge = FakeForge::new().member("x").repo("ap/hw1-x", FakeRepo::failing(401));

        let err = Collector::new(&forge, &ws, ORG, SRC)
            .collect_students(at(5, 12))
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert!(!ws.repos_dir().exists());
    }

    #[tokio::test]
    async fn test_missing_starter_aborts_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        ws.setup().unwrap();
        let forge = FakeForge::new();

        let err = Collector::new(&forge, &ws, ORG, SRC)
            .collect_starter()
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            CollectError::Starter { repo, source: ForgeError::NotFound(_) } if repo == "ap/hw1-starter"
        ));
        assert!(!ws.repos_dir().exists());
        assert!(!ws.outs_dir().exists());
    }

    #[tokio::test]
    async fn test_starter_auth_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        ws.setup().unwrap();
        let forge = FakeForge::new().repo("ap/hw1-starter", FakeRepo::failing(401));

        let err = Collector::new(&forge, &ws, ORG, SRC)
            .collect_starter()
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert!(!ws.repos_dir().exists());
    }

    #[tokio::test]
    async fn test_member_listing_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        ws.setup().unwrap();
        let forge = FakeForge::new().members_fail(500);

        let err = Collector::new(&forge, &ws, ORG, SRC)
            .collect_students(at(5, 12))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Members { .. }));
        assert!(!ws.repos_dir().exists());
    }

    #[tokio::test]
    async fn test_operator_and_excluded_logins_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        let mut forge = FakeForge::new().member("ta").member("head-ta").member("alice");
        forge.login = Some("ta".to_string());

        let summary = Collector::new(&forge, &ws, ORG, SRC)
            .with_exclude(vec!["head-ta".to_string()])
            .collect_students(at(5, 12))
            .await
            .unwrap();

        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(summary.outcomes[0].0, "alice");
        // member listing plus alice's repository lookup
        assert_eq!(forge.calls(), 2);
    }

    #[tokio::test]
    async fn test_recollecting_with_earlier_deadline_drops_stale_files() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        ws.setup().unwrap();
        let forge = hw1_forge();
        let collector = Collector::new(&forge, &ws, ORG, SRC);

        collector.collect_starter().await.unwrap();
        let late = collector.collect_students(at(20, 0)).await.unwrap();
        assert_eq!(late.collected, 2);
        assert!(ws.student_dir("student3").join("A.java").exists());
        ws.materialize_file(None, "Removed.java", b"gone upstream").unwrap();

        collector.collect_starter().await.unwrap();
        let summary = collector.collect_students(at(11, 23)).await.unwrap();

        assert_eq!(summary.no_valid_commit, 1);
        assert!(!ws.student_dir("student3").exists());
        assert_eq!(file_names(&ws.starter_dir()), vec!["A.java", "B.java"]);
        assert_eq!(
            fs::read_to_string(ws.student_dir("student1").join("A.java")).unwrap(),
            "class A { int solved; }"
        );
        let candidates = ws.comparison_input().candidates;
        assert_eq!(candidates, vec![ws.student_dir("student1").join("A.java")]);
    }

    #[tokio::test]
    async fn test_starter_login_is_not_a_student() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        let forge = hw1_forge().member("starter");

        let summary = Collector::new(&forge, &ws, ORG, SRC)
            .collect_students(at(11, 23))
            .await
            .unwrap();

        assert!(summary.outcomes.iter().all(|(login, _)| login != "starter"));
        assert!(!ws.student_dir("starter").exists());
    }

    #[tokio::test]
    async fn test_every_student_gets_exactly_one_outcome() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path(), "hw1");
        let forge = hw1_forge().member("student4").repo(
            "ap/hw1-student4",
            FakeRepo::failing(404),
        );

        let summary = Collector::new(&forge, &ws, ORG, SRC)
            .collect_students(at(11, 23))
            .await
            .unwrap();

        assert_eq!(summary.outcomes.len(), 4);
        assert_eq!(
            summary.collected + summary.empty_or_no_repo + summary.no_valid_commit,
            summary.outcomes.len()
        );
    }
}
