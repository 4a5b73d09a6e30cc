use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use super::http::{ApiClient, Auth};
use super::traits::{
    latest_at_or_before, CommitRef, Credentials, FileRef, Forge, ForgeError, ForgeResult,
    Identity, RepoHandle,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

pub struct GitHubForge {
    api: ApiClient,
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    full_name: String,
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tree {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Blob {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: Option<Signature>,
    committer: Option<Signature>,
}

#[derive(Debug, Deserialize)]
struct Signature {
    date: DateTime<Utc>,
}

impl CommitItem {
    fn into_ref(self) -> Option<CommitRef> {
        let timestamp = self
            .commit
            .committer
            .or(self.commit.author)
            .map(|s| s.date)?;
        Some(CommitRef {
            sha: self.sha,
            timestamp,
        })
    }
}

impl GitHubForge {
    /// Build a client and verify the credentials against `GET /user`.
    pub async fn connect(base_url: &str, credentials: &Credentials) -> ForgeResult<Self> {
        let auth = match credentials {
            Credentials::Token(token) => Auth::Bearer(token.clone()),
            Credentials::Basic { username, password } => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
        };
        let api = ApiClient::new(base_url, auth, "application/vnd.github+json")?;

        let user: User = api.get_json("user", &[]).await.map_err(|e| match e {
            ForgeError::NotFound(msg) => ForgeError::Unauthorized(msg),
            other => other,
        })?;
        tracing::info!(login = %user.login, name = ?user.name, "authenticated with GitHub");

        Ok(Self {
            api,
            login: Some(user.login),
        })
    }

    async fn list_logins(&self, path: &str) -> ForgeResult<Vec<Identity>> {
        let users: Vec<User> = self.api.get_paginated(path, &[]).await?;
        Ok(users
            .into_iter()
            .map(|u| Identity {
                login: u.login,
                name: u.name,
            })
            .collect())
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "GitHub"
    }

    fn current_login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    async fn find_repository(&self, owner: &str, name: &str) -> ForgeResult<RepoHandle> {
        let repo: Repo = self
            .api
            .get_json(&format!("repos/{}/{}", owner, name), &[])
            .await?;
        Ok(RepoHandle {
            id: repo.full_name.clone(),
            full_name: repo.full_name,
            default_branch: repo.default_branch,
        })
    }

    async fn list_files(
        &self,
        repo: &RepoHandle,
        path: &str,
        revision: &str,
    ) -> ForgeResult<Vec<FileRef>> {
        let tree: Tree = self
            .api
            .get_json(
                &format!("repos/{}/git/trees/{}", repo.id, revision),
                &[("recursive", "1".to_string())],
            )
            .await?;
        if tree.truncated {
            tracing::warn!(repo = %repo.full_name, "tree listing was truncated by GitHub");
        }

        Ok(files_under(tree.tree, path))
    }

    async fn fetch_content(&self, repo: &RepoHandle, file: &FileRef) -> ForgeResult<Vec<u8>> {
        let blob: Blob = self
            .api
            .get_json(&format!("repos/{}/git/blobs/{}", repo.id, file.locator), &[])
            .await?;
        match blob.encoding.as_str() {
            "base64" => super::decode_base64(&blob.content),
            "utf-8" => Ok(blob.content.into_bytes()),
            other => Err(ForgeError::Decode(format!(
                "unsupported blob encoding '{}' for {}",
                other, file.path
            ))),
        }
    }

    async fn list_org_members(&self, org: &str) -> ForgeResult<Vec<Identity>> {
        let mut members = self.list_logins(&format!("orgs/{}/members", org)).await?;

        // Only organization owners may list outside collaborators.
        match self
            .list_logins(&format!("orgs/{}/outside_collaborators", org))
            .await
        {
            Ok(outside) => {
                for identity in outside {
                    if !members.iter().any(|m| m.login == identity.login) {
                        members.push(identity);
                    }
                }
            }
            Err(ForgeError::Unauthorized(msg)) | Err(ForgeError::NotFound(msg)) => {
                tracing::warn!(%org, %msg, "cannot list outside collaborators, using members only");
            }
            Err(e) => return Err(e),
        }

        Ok(members)
    }

    async fn latest_commit_before(
        &self,
        repo: &RepoHandle,
        cutoff: DateTime<Utc>,
    ) -> ForgeResult<Option<CommitRef>> {
        let items: Vec<CommitItem> = self
            .api
            .get_json(
                &format!("repos/{}/commits", repo.id),
                &[
                    (
                        "until",
                        cutoff.to_rfc3339_opts(SecondsFormat::Secs, true),
                    ),
                    ("per_page", "100".to_string()),
                ],
            )
            .await?;

        let commits = items.into_iter().filter_map(CommitItem::into_ref).collect();
        Ok(latest_at_or_before(commits, cutoff))
    }
}

/// Blob entries at or below `path`, named by their last path segment.
fn files_under(entries: Vec<TreeEntry>, path: &str) -> Vec<FileRef> {
    let prefix = path.trim_matches('/');
    entries
        .into_iter()
        .filter(|e| e.kind == "blob")
        .filter(|e| {
            prefix.is_empty()
                || e.path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
        .map(|e| FileRef {
            name: e.path.rsplit('/').next().unwrap_or(&e.path).to_string(),
            path: e.path,
            locator: e.sha,
        })
        .collect()
}
