//! In-memory forge used by the tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::traits::{
    latest_at_or_before, CommitRef, FileRef, Forge, ForgeError, ForgeResult, Identity, RepoHandle,
};

pub const SRC: &str = "src/main/java/ir/ac/kntu";

#[derive(Default)]
pub struct FakeRepo {
    /// Snapshots in any order: commit plus the full file list at that commit.
    commits: Vec<(CommitRef, Vec<(String, Vec<u8>)>)>,
    /// Status every call on this repository fails with.
    fail_with: Option<u16>,
}

impl FakeRepo {
    pub fn failing(status: u16) -> Self {
        Self {
            commits: Vec::new(),
            fail_with: Some(status),
        }
    }

    pub fn commit(mut self, sha: &str, at: DateTime<Utc>, files: &[(&str, &str)]) -> Self {
        self.commits.push((
            CommitRef {
                sha: sha.to_string(),
                timestamp: at,
            },
            files
                .iter()
                .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                .collect(),
        ));
        self
    }

    fn check(&self) -> ForgeResult<()> {
        match self.fail_with {
            Some(status) => Err(ForgeError::from_status(status, "fake".to_string())),
            None => Ok(()),
        }
    }

    fn snapshot(&self, revision: &str) -> ForgeResult<&[(String, Vec<u8>)]> {
        if revision == "main" {
            return self
                .commits
                .iter()
                .max_by_key(|(c, _)| c.timestamp)
                .map(|(_, files)| files.as_slice())
                .ok_or_else(|| ForgeError::Conflict("empty repository".to_string()));
        }
        self.commits
            .iter()
            .find(|(c, _)| c.sha == revision)
            .map(|(_, files)| files.as_slice())
            .ok_or_else(|| ForgeError::NotFound(revision.to_string()))
    }
}

#[derive(Default)]
pub struct FakeForge {
    pub login: Option<String>,
    members: Vec<Identity>,
    members_error: Option<u16>,
    repos: HashMap<String, FakeRepo>,
    calls: Arc<AtomicUsize>,
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

impl FakeForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(mut self, login: &str) -> Self {
        self.members.push(Identity {
            login: login.to_string(),
            name: None,
        });
        self
    }

    pub fn members_fail(mut self, status: u16) -> Self {
        self.members_error = Some(status);
        self
    }

    pub fn repo(mut self, full_name: &str, repo: FakeRepo) -> Self {
        self.repos.insert(full_name.to_string(), repo);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Call counter that stays readable after the forge is boxed away.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self, repo: &RepoHandle) -> ForgeResult<&FakeRepo> {
        let fake = self
            .repos
            .get(&repo.id)
            .ok_or_else(|| ForgeError::NotFound(repo.id.clone()))?;
        fake.check()?;
        Ok(fake)
    }
}

#[async_trait]
impl Forge for FakeForge {
    fn name(&self) -> &'static str {
        "Fake"
    }

    fn current_login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    async fn find_repository(&self, owner: &str, name: &str) -> ForgeResult<RepoHandle> {
        self.hit();
        let full_name = format!("{}/{}", owner, name);
        let fake = self
            .repos
            .get(&full_name)
            .ok_or_else(|| ForgeError::NotFound(full_name.clone()))?;
        fake.check()?;
        Ok(RepoHandle {
            id: full_name.clone(),
            full_name,
            default_branch: Some("main".to_string()),
        })
    }

    async fn list_files(
        &self,
        repo: &RepoHandle,
        path: &str,
        revision: &str,
    ) -> ForgeResult<Vec<FileRef>> {
        self.hit();
        let prefix = format!("{}/", path.trim_matches('/'));
        Ok(self
            .get(repo)?
            .snapshot(revision)?
            .iter()
            .filter(|(p, _)| p.starts_with(&prefix))
            .map(|(p, _)| FileRef {
                name: p.rsplit('/').next().unwrap().to_string(),
                path: p.clone(),
                locator: format!("{}@{}", p, revision),
            })
            .collect())
    }

    async fn fetch_content(&self, repo: &RepoHandle, file: &FileRef) -> ForgeResult<Vec<u8>> {
        self.hit();
        let (path, revision) = file.locator.split_once('@').unwrap();
        self.get(repo)?
            .snapshot(revision)?
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| ForgeError::NotFound(file.locator.clone()))
    }

    async fn list_org_members(&self, _org: &str) -> ForgeResult<Vec<Identity>> {
        self.hit();
        if let Some(status) = self.members_error {
            return Err(ForgeError::from_status(status, "fake".to_string()));
        }
        Ok(self.members.clone())
    }

    async fn latest_commit_before(
        &self,
        repo: &RepoHandle,
        cutoff: DateTime<Utc>,
    ) -> ForgeResult<Option<CommitRef>> {
        self.hit();
        let fake = self.get(repo)?;
        if fake.commits.is_empty() {
            return Err(ForgeError::Conflict("Git Repository is empty.".to_string()));
        }
        let commits = fake.commits.iter().map(|(c, _)| c.clone()).collect();
        Ok(latest_at_or_before(commits, cutoff))
    }
}
