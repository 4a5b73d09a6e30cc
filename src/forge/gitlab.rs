use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use super::http::{ApiClient, Auth, USER_AGENT};
use super::traits::{
    latest_at_or_before, CommitRef, Credentials, FileRef, Forge, ForgeError, ForgeResult,
    Identity, RepoHandle,
};

pub const DEFAULT_URL: &str = "https://gitlab.com";

pub struct GitLabForge {
    api: ApiClient,
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: u64,
    path_with_namespace: String,
    default_branch: Option<String>,
    /// Set for projects without a single commit; GitLab then answers
    /// `200 []` for commits instead of 409.
    #[serde(default)]
    empty_repo: bool,
}

impl Project {
    fn into_handle(self) -> ForgeResult<RepoHandle> {
        if self.empty_repo {
            return Err(ForgeError::Conflict(format!(
                "{} is an empty repository",
                self.path_with_namespace
            )));
        }
        Ok(RepoHandle {
            id: self.id.to_string(),
            full_name: self.path_with_namespace,
            default_branch: self.default_branch,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct Blob {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Commit {
    id: String,
    committed_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct OAuthToken {
    access_token: String,
}

impl GitLabForge {
    /// Build a client for the instance at `base_url` and verify the credentials.
    ///
    /// Username/password are exchanged for an OAuth token with the password grant.
    pub async fn connect(base_url: &str, credentials: &Credentials) -> ForgeResult<Self> {
        let base = base_url.trim_end_matches('/');
        let auth = match credentials {
            Credentials::Token(token) => Auth::Header {
                name: "PRIVATE-TOKEN",
                value: token.clone(),
            },
            Credentials::Basic { username, password } => {
                Auth::Bearer(password_grant(base, username, password).await?)
            }
        };
        let api = ApiClient::new(&format!("{}/api/v4", base), auth, "application/json")?;

        let user: User = api.get_json("user", &[]).await?;
        tracing::info!(login = %user.username, name = ?user.name, "authenticated with GitLab");

        Ok(Self {
            api,
            login: Some(user.username),
        })
    }
}

async fn password_grant(base: &str, username: &str, password: &str) -> ForgeResult<String> {
    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let response = client
        .post(format!("{}/oauth/token", base))
        .json(&serde_json::json!({
            "grant_type": "password",
            "username": username,
            "password": password,
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        // Doorkeeper answers bad credentials with 400 invalid_grant.
        let message = format!("password grant rejected for '{}'", username);
        return Err(match status.as_u16() {
            400 | 401 | 403 => ForgeError::Unauthorized(message),
            code => ForgeError::from_status(code, message),
        });
    }

    let token: OAuthToken = response
        .json()
        .await
        .map_err(|e| ForgeError::Decode(e.to_string()))?;
    Ok(token.access_token)
}

fn encode_path(path: &str) -> String {
    urlencoding::encode(path).into_owned()
}

#[async_trait]
impl Forge for GitLabForge {
    fn name(&self) -> &'static str {
        "GitLab"
    }

    fn current_login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    async fn find_repository(&self, owner: &str, name: &str) -> ForgeResult<RepoHandle> {
        let project: Project = self
            .api
            .get_json(
                &format!("projects/{}", encode_path(&format!("{}/{}", owner, name))),
                &[],
            )
            .await?;
        project.into_handle()
    }

    async fn list_files(
        &self,
        repo: &RepoHandle,
        path: &str,
        revision: &str,
    ) -> ForgeResult<Vec<FileRef>> {
        let entries: Vec<TreeEntry> = self
            .api
            .get_paginated(
                &format!("projects/{}/repository/tree", repo.id),
                &[
                    ("path", path.trim_matches('/').to_string()),
                    ("recursive", "true".to_string()),
                    ("ref", revision.to_string()),
                ],
            )
            .await?;

        Ok(entries
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| FileRef {
                name: e.name,
                path: e.path,
                locator: e.id,
            })
            .collect())
    }

    async fn fetch_content(&self, repo: &RepoHandle, file: &FileRef) -> ForgeResult<Vec<u8>> {
        let blob: Blob = self
            .api
            .get_json(
                &format!("projects/{}/repository/blobs/{}", repo.id, file.locator),
                &[],
            )
            .await?;
        match blob.encoding.as_deref() {
            Some("base64") | None => super::decode_base64(&blob.content),
            Some("text") => Ok(blob.content.into_bytes()),
            Some(other) => Err(ForgeError::Decode(format!(
                "unsupported blob encoding '{}' for {}",
                other, file.path
            ))),
        }
    }

    async fn list_org_members(&self, org: &str) -> ForgeResult<Vec<Identity>> {
        let users: Vec<User> = self
            .api
            .get_paginated(&format!("groups/{}/members", encode_path(org)), &[])
            .await?;
        Ok(users
            .into_iter()
            .map(|u| Identity {
                login: u.username,
                name: u.name,
            })
            .collect())
    }

    async fn latest_commit_before(
        &self,
        repo: &RepoHandle,
        cutoff: DateTime<Utc>,
    ) -> ForgeResult<Option<CommitRef>> {
        let mut query = vec![
            ("until", cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("per_page", "100".to_string()),
        ];
        if let Some(branch) = &repo.default_branch {
            query.push(("ref_name", branch.clone()));
        }

        let commits: Vec<Commit> = self
            .api
            .get_json(&format!("projects/{}/repository/commits", repo.id), &query)
            .await?;

        let commits = commits
            .into_iter()
            .map(|c| CommitRef {
                sha: c.id,
                timestamp: c.committed_date,
            })
            .collect();
        Ok(latest_at_or_before(commits, cutoff))
    }
}
