use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Forge credentials. Exactly one authentication mode is ever used.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Basic { username: String, password: String },
}

impl Credentials {
    pub fn mode(&self) -> &'static str {
        match self {
            Credentials::Token(_) => "token",
            Credentials::Basic { .. } => "username/password",
        }
    }
}

// Keep secrets out of logs and panics.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => write!(f, "Credentials::Token(***)"),
            Credentials::Basic { username, .. } => {
                write!(f, "Credentials::Basic {{ username: {:?}, password: *** }}", username)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Forge-specific identifier (`owner/name` on GitHub, numeric id on GitLab)
    pub id: String,
    pub full_name: String,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub path: String,
    /// Blob id used to fetch the content
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub login: String,
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict (empty repository?): {0}")]
    Conflict(String),

    #[error("Forge returned HTTP {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ForgeError {
    /// Map an HTTP status to the matching error variant.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => ForgeError::Unauthorized(message),
            404 => ForgeError::NotFound(message),
            409 => ForgeError::Conflict(message),
            _ => ForgeError::Service { status, message },
        }
    }
}

pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

/// Uniform capability over the supported forges.
#[async_trait]
pub trait Forge: Send + Sync {
    fn name(&self) -> &'static str;

    /// Login of the authenticated account, if known.
    fn current_login(&self) -> Option<&str>;

    async fn find_repository(&self, owner: &str, name: &str) -> ForgeResult<RepoHandle>;

    /// Files under `path` (recursively) as of `revision`.
    async fn list_files(
        &self,
        repo: &RepoHandle,
        path: &str,
        revision: &str,
    ) -> ForgeResult<Vec<FileRef>>;

    async fn fetch_content(&self, repo: &RepoHandle, file: &FileRef) -> ForgeResult<Vec<u8>>;

    async fn list_org_members(&self, org: &str) -> ForgeResult<Vec<Identity>>;

    /// Latest commit whose timestamp is at or before `cutoff`.
    async fn latest_commit_before(
        &self,
        repo: &RepoHandle,
        cutoff: DateTime<Utc>,
    ) -> ForgeResult<Option<CommitRef>>;
}

/// Pick the newest commit not after `cutoff`. The bound is inclusive.
pub fn latest_at_or_before(commits: Vec<CommitRef>, cutoff: DateTime<Utc>) -> Option<CommitRef> {
    commits
        .into_iter()
        .filter(|c| c.timestamp <= cutoff)
        .max_by_key(|c| c.timestamp)
}
