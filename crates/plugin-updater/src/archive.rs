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

//! Release artifact extraction

use crate::error::{Result, UpdaterError};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

pub trait Unpacker: Debug + Send + Sync {
    /// Unpack `archive` into the empty directory `into` and return the
    /// directory that should become the installed package.
    fn unpack(&self, archive: &Path, into: &Path) -> Result<PathBuf>;
}

/// Unpacks GitHub zipballs.
///
/// A zipball wraps everything in one `<owner>-<repo>-<sha>/` directory, which
/// is returned as the package root. Archives with several top-level entries
/// are installed as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipUnpacker;

impl Unpacker for ZipUnpacker {
    fn unpack(&self, archive: &Path, into: &Path) -> Result<PathBuf> {
        extract_zip(archive, into)?;
        package_root(into)
    }
}

fn extract_error(context: &str, path: &Path, e: impl std::fmt::Display) -> UpdaterError {
    UpdaterError::Extract(format!("{context} {}: {e}", path.display()))
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(zip_path)
        .map_err(|e| extract_error("failed to open archive", zip_path, e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| extract_error("failed to read archive", zip_path, e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extract_error("failed to read entry of", zip_path, e))?;
        let Some(name) = entry.enclosed_name() else {
            tracing::warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| extract_error("failed to create directory", &out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| extract_error("failed to create directory", parent, e))?;
        }
        let mut outfile = std::fs::File::create(&out_path)
            .map_err(|e| extract_error("failed to create file", &out_path, e))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| extract_error("failed to extract", &out_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode()
                && let Err(e) =
                    std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
            {
                tracing::warn!(
                    "Failed to set mode {mode:o} on {}: {e}",
                    out_path.display()
                );
            }
        }
    }

    tracing::debug!("Extracted {} entries to {}", archive.len(), dest.display());
    Ok(())
}

fn package_root(dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| extract_error("failed to list", dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| extract_error("failed to list", dir, e))?;

    match entries.as_slice() {
        [] => Err(UpdaterError::Extract("archive is empty".to_string())),
        [only] if only.path().is_dir() => Ok(only.path()),
        _ => Ok(dir.to_path_buf()),
    }
}
