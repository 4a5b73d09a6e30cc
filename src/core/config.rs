use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::comparators::traits::CompareOptions;
use crate::forge::{Credentials, ForgeKind};

pub const CONFIG_FILE: &str = "ap-moss.yml";
pub const DEFAULT_SOURCE_PATH: &str = "src/main/java/ir/ac/kntu";
pub const DEFAULT_MOSS_SERVER: &str = "moss.stanford.edu:7690";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Please provide either username/password or an auth token for the forge (--token or AP_MOSS_TOKEN)")]
    MissingCredentials,

    #[error("A password is required when --username is given")]
    MissingPassword,

    #[error("Please provide a MOSS id either through --mid or the MOSS_ID environment variable")]
    MissingMossId,

    #[error("Please provide the organization through --org, AP_MOSS_ORG or the config file")]
    MissingOrg,

    #[error("Invalid deadline '{0}', expected YYYY-MM-DD-HH")]
    InvalidDeadline(String),

    #[error("Invalid config file {path}: {source}")]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Settings read from `ap-moss.yml`. Every field is optional; command-line
/// flags and environment variables take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub forge: Option<ForgeKind>,
    pub forge_url: Option<String>,
    pub org: Option<String>,
    pub source_path: Option<String>,
    pub exclude: Option<Vec<String>>,
    pub moss: Option<MossConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MossConfig {
    pub server: Option<String>,
    pub language: Option<String>,
    pub ignore_limit: Option<u32>,
    pub max_matches: Option<u32>,
    pub directory_mode: Option<bool>,
    pub experimental: Option<bool>,
    pub comment: Option<String>,
}

impl Config {
    /// Load the file at `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn source_path(&self) -> &str {
        self.source_path.as_deref().unwrap_or(DEFAULT_SOURCE_PATH)
    }

    pub fn moss_server(&self) -> &str {
        self.moss
            .as_ref()
            .and_then(|m| m.server.as_deref())
            .unwrap_or(DEFAULT_MOSS_SERVER)
    }

    /// Engine options from the file, with `ignore_limit` taken from the command line.
    pub fn compare_options(&self, ignore_limit: u32) -> CompareOptions {
        let mut options = CompareOptions {
            ignore_limit,
            ..CompareOptions::default()
        };
        if let Some(moss) = &self.moss {
            if let Some(language) = &moss.language {
                options.language = language.clone();
            }
            if let Some(n) = moss.max_matches {
                options.max_matches_shown = n;
            }
            if let Some(d) = moss.directory_mode {
                options.directory_mode = d;
            }
            if let Some(x) = moss.experimental {
                options.experimental = x;
            }
            if let Some(c) = &moss.comment {
                options.comment = c.clone();
            }
        }
        options
    }
}

/// Pick exactly one authentication mode. A username always means basic auth,
/// even when a token is also available.
pub fn resolve_credentials(
    username: Option<&str>,
    password: Option<&str>,
    token: Option<&str>,
) -> Result<Credentials, ConfigError> {
    match (non_empty(username), non_empty(token)) {
        (Some(username), _) => {
            let password = non_empty(password).ok_or(ConfigError::MissingPassword)?;
            Ok(Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
        (None, Some(token)) => Ok(Credentials::Token(token.to_string())),
        (None, None) => Err(ConfigError::MissingCredentials),
    }
}

pub fn resolve_moss_id(moss_id: Option<&str>) -> Result<String, ConfigError> {
    non_empty(moss_id)
        .map(str::to_string)
        .ok_or(ConfigError::MissingMossId)
}

pub fn resolve_org(flag: Option<&str>, config: &Config) -> Result<String, ConfigError> {
    non_empty(flag)
        .or_else(|| non_empty(config.org.as_deref()))
        .map(str::to_string)
        .ok_or(ConfigError::MissingOrg)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
