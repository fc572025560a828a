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

//! Configuration module for the updater

use crate::error::{Result, UpdaterError};
use crate::release_client::RepoId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `access_token` from the config file
pub const TOKEN_ENV: &str = "PLUGIN_UPDATER_TOKEN";

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("plugin-updater/{}", env!("CARGO_PKG_VERSION"))
}

fn default_30() -> u64 {
    30
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// GitHub account owning the release repository
    pub owner: String,

    /// Repository name
    pub repo: String,

    /// Directory the package is installed into
    pub install_dir: PathBuf,

    /// Package identifier, defaults to the install directory name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    /// Entry file the host knows the package by, defaults to the slug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_file: Option<String>,

    /// Token for private repositories. Read, never written back.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    /// Custom API base URL (overrides the public GitHub API)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_30")]
    pub request_timeout_secs: u64,

    /// Version to assume when the install carries no version marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// Host version advertised in update offers when the notes carry no `tested:` line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tested: Option<String>,
}

impl fmt::Debug for UpdaterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdaterConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("install_dir", &self.install_dir)
            .field("slug", &self.slug)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            install_dir: PathBuf::new(),
            slug: None,
            package_file: None,
            access_token: None,
            api_base_url: default_api_base_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: 30,
            installed_version: None,
            name: None,
            author: None,
            homepage: None,
            default_tested: None,
        }
    }
}

impl UpdaterConfig {
    pub fn repo_id(&self) -> RepoId {
        RepoId::new(&self.owner, &self.repo)
    }

    /// Package identifier: the configured slug or the install directory name
    pub fn slug(&self) -> Result<String> {
        if let Some(slug) = self.slug.as_deref().filter(|s| !s.is_empty()) {
            return Ok(slug.to_string());
        }
        self.install_dir
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                UpdaterError::Config(format!(
                    "Cannot derive slug from install_dir {}",
                    self.install_dir.display()
                ))
            })
    }

    pub fn package_file(&self) -> Result<String> {
        match self.package_file.as_deref() {
            Some(file) if !file.is_empty() => Ok(file.to_string()),
            _ => self.slug(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(UpdaterError::Config("owner must not be empty".to_string()));
        }
        if self.repo.trim().is_empty() {
            return Err(UpdaterError::Config("repo must not be empty".to_string()));
        }
        if self.install_dir.as_os_str().is_empty() {
            return Err(UpdaterError::Config(
                "install_dir must not be empty".to_string(),
            ));
        }
        self.slug()?;
        Ok(())
    }
}

/// Pick the token from the environment if set, otherwise keep the file's
fn resolve_token(from_file: Option<String>, from_env: Option<String>) -> Option<String> {
    from_env
        .filter(|t| !t.is_empty())
        .or_else(|| from_file.filter(|t| !t.is_empty()))
}

pub fn load_config(path: &Path) -> Result<UpdaterConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        UpdaterError::Config(format!("Failed to read config {}: {e}", path.display()))
    })?;
    let mut config: UpdaterConfig = serde_json::from_str(&content)
        .map_err(|e| UpdaterError::Config(format!("Failed to parse config: {e}")))?;

    config.access_token = resolve_token(config.access_token.take(), std::env::var(TOKEN_ENV).ok());
    config.validate()?;
    Ok(config)
}

pub fn save_config(config: &UpdaterConfig, path: &Path) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let content = serde_json::to_string_pretty(config)?;

    // Atomic write
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;

    Ok(())
}
