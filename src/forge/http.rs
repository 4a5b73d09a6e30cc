//! Thin JSON client shared by the forge implementations.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use super::traits::{ForgeError, ForgeResult};

pub const USER_AGENT: &str = concat!("ap-moss/", env!("CARGO_PKG_VERSION"));

/// How requests are authorized against the API.
#[derive(Clone)]
pub enum Auth {
    Bearer(String),
    Basic { username: String, password: String },
    Header { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: Auth,
}

impl ApiClient {
    pub fn new(base_url: &str, auth: Auth, accept: &str) -> ForgeResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(accept).map_err(|e| ForgeError::Decode(e.to_string()))?,
        );
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Header { name, value } => request.header(*name, value),
        }
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ForgeResult<T> {
        let url = self.url(path);
        tracing::debug!(%url, ?query, "GET");

        let response = self
            .authorize(self.client.get(&url))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::from_status(
                status.as_u16(),
                format!("{} ({})", url, error_message(&body)),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ForgeError::Decode(format!("{}: {}", url, e)))
    }

    /// GET every page of a list endpoint that takes `page`/`per_page`.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ForgeResult<Vec<T>> {
        const PER_PAGE: usize = 100;
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let mut params = query.to_vec();
            params.push(("per_page", PER_PAGE.to_string()));
            params.push(("page", page.to_string()));

            let batch: Vec<T> = self.get_json(path, &params).await?;
            let len = batch.len();
            items.extend(batch);

            if len < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}

/// Pull the `message` (GitHub) or `message`/`error` (GitLab) field out of an error body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error_description", "error"] {
            if let Some(msg) = value.get(key) {
                return match msg {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
            }
        }
    }
    body.chars().take(200).collect()
}
