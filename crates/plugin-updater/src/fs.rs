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

//! Filesystem primitives used to swap a package directory

use std::fmt::Debug;
use std::io;
use std::path::Path;

/// Operations the executor needs to move directories around.
///
/// `rename` must be atomic for paths on the same filesystem.
pub trait PackageFs: Debug + Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// `std::fs` backed implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl PackageFs for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FailingFs;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_fs_rename() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        std::fs::create_dir(&from).unwrap();

        LocalFs.rename(&from, &to).unwrap();
        assert!(!LocalFs.exists(&from));
        assert!(LocalFs.exists(&to));
    }

    #[test]
    fn test_failing_fs_fails_once() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        std::fs::create_dir(&from).unwrap();

        let fs = FailingFs::new(&to, 1);
        assert!(fs.rename(&from, &to).is_err());
        assert!(fs.exists(&from));
        fs.rename(&from, &to).unwrap();
        assert!(fs.exists(&to));
    }
}
