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

//! Host platform collaborator
//!
//! The host owns package metadata and the enabled/disabled bookkeeping.
//! The updater only reads the former and flips the latter back on after an
//! upgrade.

use crate::config::UpdaterConfig;
use crate::error::{Result, UpdaterError};
use serde::Serialize;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// File inside the install directory holding the installed release tag
pub const VERSION_MARKER: &str = ".installed-version";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageMetadata {
    pub name: String,
    pub author: Option<String>,
    pub homepage: Option<String>,
    pub version: String,
}

pub trait Host: Debug + Send + Sync {
    fn package_metadata(&self, id: &str) -> Result<PackageMetadata>;
    fn is_enabled(&self, id: &str) -> Result<bool>;
    /// Enable the package installed at `path`. Failures are `UpdaterError::Enable`.
    fn enable(&self, id: &str, path: &Path) -> Result<()>;
}

/// Directory-backed host used by the CLI.
///
/// The installed version comes from [`VERSION_MARKER`] and the enabled state
/// is a `.<slug>.enabled` file next to the install directory.
#[derive(Debug, Clone)]
pub struct LocalHost {
    install_dir: PathBuf,
    name: Option<String>,
    author: Option<String>,
    homepage: Option<String>,
    fallback_version: Option<String>,
}

impl LocalHost {
    pub fn new(install_dir: &Path) -> Self {
        Self {
            install_dir: install_dir.to_path_buf(),
            name: None,
            author: None,
            homepage: None,
            fallback_version: None,
        }
    }

    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self {
            install_dir: config.install_dir.clone(),
            name: config.name.clone(),
            author: config.author.clone(),
            homepage: config.homepage.clone(),
            fallback_version: config.installed_version.clone(),
        }
    }

    fn enabled_flag(&self, id: &str) -> PathBuf {
        let parent = self
            .install_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{id}.enabled"))
    }

    fn read_marker(&self) -> Option<String> {
        let content = std::fs::read_to_string(self.install_dir.join(VERSION_MARKER)).ok()?;
        let version = content.trim();
        (!version.is_empty()).then(|| version.to_string())
    }
}

impl Host for LocalHost {
    fn package_metadata(&self, id: &str) -> Result<PackageMetadata> {
        let version = self
            .read_marker()
            .or_else(|| self.fallback_version.clone())
            .ok_or_else(|| {
                UpdaterError::Host(format!(
                    "No installed version known for {id} at {}",
                    self.install_dir.display()
                ))
            })?;

        Ok(PackageMetadata {
            name: self.name.clone().unwrap_or_else(|| id.to_string()),
            author: self.author.clone(),
            homepage: self.homepage.clone(),
            version,
        })
    }

    fn is_enabled(&self, id: &str) -> Result<bool> {
        Ok(self.enabled_flag(id).exists())
    }

    fn enable(&self, id: &str, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(UpdaterError::Enable(format!(
                "{} is not an installed package",
                path.display()
            )));
        }

        let flag = self.enabled_flag(id);
        let temp = flag.with_extension("tmp");
        std::fs::write(&temp, path.to_string_lossy().as_bytes())
            .and_then(|()| std::fs::rename(&temp, &flag))
            .map_err(|e| UpdaterError::Enable(format!("Failed to enable {id}: {e}")))?;

        tracing::info!("Enabled {id} at {}", path.display());
        Ok(())
    }
}
