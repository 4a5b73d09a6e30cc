#[cfg(test)]
pub mod fake;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod traits;

use async_trait::async_trait;
use base64::Engine;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use github::GitHubForge;
pub use gitlab::GitLabForge;
pub use traits::{Credentials, Forge, ForgeError, ForgeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ForgeKind {
    #[default]
    Github,
    Gitlab,
}

impl ForgeKind {
    pub fn default_url(&self) -> &'static str {
        match self {
            ForgeKind::Github => github::DEFAULT_API_URL,
            ForgeKind::Gitlab => gitlab::DEFAULT_URL,
        }
    }
}

impl std::fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForgeKind::Github => write!(f, "github"),
            ForgeKind::Gitlab => write!(f, "gitlab"),
        }
    }
}

/// Authenticate against the selected forge.
pub async fn connect(
    kind: ForgeKind,
    base_url: Option<&str>,
    credentials: &Credentials,
) -> ForgeResult<Box<dyn Forge>> {
    let url = base_url.unwrap_or_else(|| kind.default_url());
    tracing::debug!(forge = %kind, %url, mode = credentials.mode(), "connecting");

    Ok(match kind {
        ForgeKind::Github => Box::new(GitHubForge::connect(url, credentials).await?),
        ForgeKind::Gitlab => Box::new(GitLabForge::connect(url, credentials).await?),
    })
}

/// Opens an authenticated forge session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> ForgeResult<Box<dyn Forge>>;
}

/// Connects to a real forge over HTTP.
pub struct ForgeConnector {
    pub kind: ForgeKind,
    pub base_url: Option<String>,
}

#[async_trait]
impl Connector for ForgeConnector {
    async fn connect(&self, credentials: &Credentials) -> ForgeResult<Box<dyn Forge>> {
        connect(self.kind, self.base_url.as_deref(), credentials).await
    }
}

/// Decode base64 blob content; the forges wrap it at 60/76 columns.
pub(crate) fn decode_base64(content: &str) -> ForgeResult<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ForgeError::Decode(format!("invalid base64 content: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wrapped_base64() {
        let wrapped = "cHVibGljIGNsYXNzIE1h\naW4ge30=\n";
        assert_eq!(decode_base64(wrapped).unwrap(), b"public class Main {}");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_base64("%%%"), Err(ForgeError::Decode(_))));
    }

    #[test]
    fn test_forge_kind_default_urls() {
        assert_eq!(ForgeKind::default(), ForgeKind::Github);
        assert_eq!(ForgeKind::Github.default_url(), "https://api.github.com");
        assert_eq!(ForgeKind::Gitlab.default_url(), "https://gitlab.com");
    }
}
