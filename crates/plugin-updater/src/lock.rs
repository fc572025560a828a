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

//! Exclusive lock guarding an install directory while it is replaced

use crate::error::{Result, UpdaterError};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Process-wide lock on `.<name>.lock` next to the install directory.
///
/// Released when dropped.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    pub fn lock_path(destination: &Path) -> Result<PathBuf> {
        let name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UpdaterError::Lock(format!("{} has no directory name", destination.display()))
            })?;
        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Ok(parent.join(format!(".{name}.lock")))
    }

    /// Block (off the async runtime) until the lock is ours
    pub async fn acquire(destination: &Path) -> Result<Self> {
        let path = Self::lock_path(destination)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                UpdaterError::Lock(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        if let Some(lock) = Self::try_acquire(destination)? {
            tracing::debug!("Acquired install lock {}", path.display());
            return Ok(lock);
        }
        tracing::info!(
            "Another upgrade holds {}, waiting for it to finish",
            path.display()
        );

        let lock_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&lock_path)
                .map_err(|e| {
                    UpdaterError::Lock(format!("Failed to open {}: {e}", lock_path.display()))
                })?;
            FileExt::lock_exclusive(&file).map_err(|e| {
                UpdaterError::Lock(format!("Failed to lock {}: {e}", lock_path.display()))
            })?;
            Ok(file)
        })
        .await
        .map_err(|e| UpdaterError::Lock(format!("Lock task failed: {e}")))??;

        tracing::debug!("Acquired install lock {}", path.display());
        Ok(Self { file, path })
    }

    /// Take the lock only if nobody holds it
    pub fn try_acquire(destination: &Path) -> Result<Option<Self>> {
        let path = Self::lock_path(destination)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| UpdaterError::Lock(format!("Failed to open {}: {e}", path.display())))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(true) => Ok(Some(Self { file, path })),
            Ok(false) => Ok(None),
            Err(e) => Err(UpdaterError::Lock(format!(
                "Failed to lock {}: {e}",
                path.display()
            ))),
        }
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to unlock {}: {e}", self.path.display());
        }
    }
}
