//! Mirrors a MOSS result page and the match pages it links to.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::forge::http::USER_AGENT;

pub const INDEX_FILE: &str = "report.html";

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("{} returned HTTP {}", url, status);
        }
        Ok(response.text().await?)
    }
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\b(href|src)\s*=\s*"([^"]*match[^"]*)""#).expect("valid link pattern")
    })
}

/// Point every match link at a local file and return the absolute URLs to fetch.
pub fn rewrite_links(html: &str, base_url: &str) -> (String, Vec<String>) {
    let mut found = Vec::new();
    let rewritten = link_pattern().replace_all(html, |caps: &regex::Captures| {
        let attr = &caps[1];
        let link = &caps[2];
        let (target, fragment) = match link.split_once('#') {
            Some((target, fragment)) => (target, format!("#{}", fragment)),
            None => (link, String::new()),
        };
        let basename = target.rsplit('/').next().unwrap_or(target);
        if !basename.is_empty() {
            let absolute = if basename == target {
                format!("{}{}", base_url, basename)
            } else {
                target.to_string()
            };
            if !found.contains(&absolute) {
                found.push(absolute);
            }
        }
        format!("{}=\"{}{}\"", attr, basename, fragment)
    });
    (rewritten.into_owned(), found)
}

/// Fetch `url` and everything it links to, writing the pages into `dest`.
/// Returns the saved file paths, index first.
pub async fn download_report(
    fetcher: &dyn PageFetcher,
    url: &str,
    dest: &Path,
) -> Result<Vec<PathBuf>> {
    let url = url.trim();
    if url.is_empty() {
        bail!("Empty report url");
    }
    std::fs::create_dir_all(dest).with_context(|| format!("Failed to create {}", dest.display()))?;

    let index_url = url.trim_end_matches('/').to_string();
    let base_url = format!("{}/", index_url);
    let mut queue = VecDeque::from([index_url.clone()]);
    let mut seen: HashSet<String> = HashSet::from([index_url.clone()]);
    let mut saved = Vec::new();

    while let Some(page) = queue.pop_front() {
        let html = fetcher.fetch(&page).await?;
        let (local, links) = rewrite_links(&html, &base_url);

        let file_name = if page == index_url {
            INDEX_FILE.to_string()
        } else {
            page.rsplit('/').next().unwrap_or(INDEX_FILE).to_string()
        };
        let path = dest.join(&file_name);
        std::fs::write(&path, local).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(%page, path = %path.display(), "saved report page");
        saved.push(path);

        for link in links {
            if seen.insert(link.clone()) {
                queue.push_back(link);
            }
        }
    }

    Ok(saved)
}
