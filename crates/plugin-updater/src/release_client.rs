// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! GitHub API release lookup module

use crate::config::UpdaterConfig;
use crate::error::{Result, UpdaterError};
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const TOKEN_PARAM: &str = "access_token";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// `owner/repo` pair identifying a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    /// Human-facing releases page of the repository
    pub fn releases_page(&self) -> String {
        format!("https://github.com/{}/{}/releases", self.owner, self.name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(UpdaterError::Config(format!(
                "Invalid repository {s:?}, expected owner/repo"
            ))),
        }
    }
}

/// Latest release as published on GitHub
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    pub tag: String,
    pub published_at: Option<DateTime<Utc>>,
    pub notes_body: String,
    pub artifact_url: String,
}

impl ReleaseInfo {
    /// Tag without a leading "v"
    pub fn version(&self) -> &str {
        crate::version::version_from_tag(&self.tag)
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    body: Option<String>,
    zipball_url: String,
}

impl From<GithubRelease> for ReleaseInfo {
    fn from(release: GithubRelease) -> Self {
        Self {
            tag: release.tag_name,
            published_at: release.published_at,
            notes_body: release.body.unwrap_or_default(),
            artifact_url: release.zipball_url,
        }
    }
}

/// Append `access_token` to `url` when a token is given
pub fn authorized_url(url: &str, token: Option<&str>) -> std::result::Result<Url, String> {
    let mut url = Url::parse(url).map_err(|e| format!("Invalid URL {url:?}: {e}"))?;
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
    }
    Ok(url)
}

/// Render a URL for logs with the token value masked
pub fn redact_token(url: &Url) -> String {
    if !url.query_pairs().any(|(key, _)| key == TOKEN_PARAM) {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == TOKEN_PARAM {
                "***".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Turn either response shape into a single release.
///
/// The releases endpoint returns a list (newest first) while single-release
/// endpoints and some proxies return a bare object.
fn normalize_release(value: Value) -> Result<ReleaseInfo> {
    let release = match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| UpdaterError::NotFound("release list is empty".to_string()))?,
        object @ Value::Object(_) => object,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            return Err(UpdaterError::Parse(
                "expected a release object or a list of releases".to_string(),
            ));
        }
    };

    let release: GithubRelease = serde_json::from_value(release)
        .map_err(|e| UpdaterError::Parse(format!("Invalid release: {e}")))?;
    Ok(release.into())
}

#[derive(Debug, Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    api_base_url: String,
    timeout: Duration,
}

impl ReleaseClient {
    pub fn new(api_base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| UpdaterError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &UpdaterConfig) -> Result<Self> {
        Self::new(
            &config.api_base_url,
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Shared HTTP client, reused for artifact downloads
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetch the newest release of `repo`. One request, no retries.
    pub async fn fetch_latest(&self, repo: &RepoId, auth_token: Option<&str>) -> Result<ReleaseInfo> {
        let endpoint = format!(
            "{}/repos/{}/{}/releases",
            self.api_base_url, repo.owner, repo.name
        );
        let url = authorized_url(&endpoint, auth_token).map_err(UpdaterError::Config)?;
        tracing::debug!("Fetching releases from {}", redact_token(&url));

        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpdaterError::Network(format!("Request failed: {}", e.without_url())))?;

        // Check rate limit
        if let Some(remaining) = response.headers().get("x-ratelimit-remaining")
            && let Ok(remaining_str) = remaining.to_str()
            && let Ok(remaining_int) = remaining_str.parse::<u32>()
            && remaining_int < 10
        {
            tracing::warn!("GitHub rate limit low: {remaining_int} remaining");
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(UpdaterError::NotFound(format!(
                "no releases endpoint for {repo}"
            )));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(UpdaterError::Network(format!(
                "GitHub API error {status}: {}",
                snippet(&body)
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpdaterError::Network(format!("Failed to read response: {}", e.without_url())))?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| UpdaterError::Parse(format!("Response is not JSON: {e}")))?;

        let release = normalize_release(value)?;
        tracing::info!("Latest release of {repo}: {}", release.tag);
        Ok(release)
    }
}
