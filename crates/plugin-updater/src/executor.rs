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

//! Release installation: download, stage and swap into place
//!
//! Everything is staged in a hidden directory next to the install path so the
//! final swap is two renames on one filesystem. The previous install is moved
//! aside first and moved back if the new one cannot be put in its place.

use crate::archive::{Unpacker, ZipUnpacker};
use crate::error::{Result, UpdaterError, UpgradeStep};
use crate::events::{UpgradeEvent, report_event};
use crate::fs::{LocalFs, PackageFs};
use crate::host::{Host, VERSION_MARKER};
use crate::lock::InstallLock;
use crate::release_client::{ReleaseInfo, authorized_url, redact_token};
use futures_util::StreamExt;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const ARTIFACT_FILE: &str = "artifact.zip";
const UNPACK_DIR: &str = "unpacked";
const PREVIOUS_DIR: &str = "previous";
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Snapshot of the package being upgraded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub identifier: String,
    pub current_version: String,
    pub install_path: PathBuf,
    /// Captured right before the upgrade and restored after it
    pub was_enabled: bool,
}

#[derive(Debug)]
pub enum UpgradeResult {
    /// The release is installed. `enable_error` is set when the package was
    /// enabled before but could not be enabled again at its new location.
    Applied {
        version: String,
        enable_error: Option<UpdaterError>,
    },
    NotNeeded,
    Failed(UpdaterError),
}

impl UpgradeResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Step that failed, for `Failed` results
    pub fn failed_step(&self) -> Option<UpgradeStep> {
        match self {
            Self::Failed(e) => e.step(),
            Self::Applied { .. } | Self::NotNeeded => None,
        }
    }
}

impl fmt::Display for UpgradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied {
                version,
                enable_error: None,
            } => write!(f, "upgraded to {version}"),
            Self::Applied {
                version,
                enable_error: Some(e),
            } => write!(f, "upgraded to {version}, but the package is inactive ({e})"),
            Self::NotNeeded => f.write_str("already up to date"),
            Self::Failed(e) => write!(f, "upgrade failed: {e}"),
        }
    }
}

fn step_name(e: &UpdaterError) -> String {
    e.step()
        .map_or_else(|| "unknown step".to_string(), |step| step.to_string())
}

fn ensure_not_cancelled(cancel: &CancellationToken, next: UpgradeStep) -> Result<()> {
    if cancel.is_cancelled() {
        tracing::warn!("Upgrade cancelled before {next}");
        return Err(UpdaterError::Cancelled { before: next });
    }
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

#[derive(Debug, Clone)]
pub struct UpgradeExecutor {
    http: reqwest::Client,
    fs: Arc<dyn PackageFs>,
    host: Arc<dyn Host>,
    unpacker: Arc<dyn Unpacker>,
    /// Longest wait for the response or for the next body chunk
    read_timeout: Duration,
}

impl UpgradeExecutor {
    pub fn new(
        http: reqwest::Client,
        fs: Arc<dyn PackageFs>,
        host: Arc<dyn Host>,
        unpacker: Arc<dyn Unpacker>,
    ) -> Self {
        Self {
            http,
            fs,
            host,
            unpacker,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Executor on the local filesystem unpacking GitHub zipballs
    pub fn local(http: reqwest::Client, host: Arc<dyn Host>) -> Self {
        Self::new(http, Arc::new(LocalFs), host, Arc::new(ZipUnpacker))
    }

    /// Install `release` over `package.install_path`.
    ///
    /// Never retries. The install lock is held for the whole call.
    pub async fn apply(
        &self,
        release: &ReleaseInfo,
        package: &InstalledPackage,
        auth_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> UpgradeResult {
        let started = Instant::now();
        let version = release.version().to_string();
        tracing::info!(
            "Upgrading {} from {} to {version}",
            package.identifier,
            package.current_version
        );
        report_event(&UpgradeEvent::UpgradeStarted {
            package: package.identifier.clone(),
            from_version: package.current_version.clone(),
            to_version: version.clone(),
        });

        match self.run(release, package, auth_token, cancel).await {
            Ok(enable_error) => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!("Installed {} {version} in {duration_ms}ms", package.identifier);
                report_event(&UpgradeEvent::UpgradeCompleted {
                    package: package.identifier.clone(),
                    from_version: package.current_version.clone(),
                    to_version: version.clone(),
                    duration_ms,
                });
                if let Some(ref e) = enable_error {
                    tracing::warn!("{} {version} installed but not enabled: {e}", package.identifier);
                    report_event(&UpgradeEvent::EnableFailed {
                        package: package.identifier.clone(),
                        version: version.clone(),
                        error: e.to_string(),
                    });
                }
                UpgradeResult::Applied {
                    version,
                    enable_error,
                }
            }
            Err(e) => {
                tracing::error!("Upgrade of {} to {version} failed: {e}", package.identifier);
                report_event(&UpgradeEvent::UpgradeFailed {
                    package: package.identifier.clone(),
                    to_version: version,
                    step: step_name(&e),
                    error: e.to_string(),
                });
                UpgradeResult::Failed(e)
            }
        }
    }

    /// Returns the enable failure, if any, once the new release is in place
    async fn run(
        &self,
        release: &ReleaseInfo,
        package: &InstalledPackage,
        auth_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<UpdaterError>> {
        let destination = package.install_path.as_path();
        let _lock = InstallLock::acquire(destination).await?;

        ensure_not_cancelled(cancel, UpgradeStep::Download)?;
        let url = authorized_url(&release.artifact_url, auth_token).map_err(UpdaterError::Download)?;
        let staging = create_staging(destination)?;
        let archive = staging.path().join(ARTIFACT_FILE);
        let (bytes, sha256) = self.download(&url, &archive).await?;
        tracing::info!("Downloaded {bytes} bytes, sha256 {sha256}");
        report_event(&UpgradeEvent::ArtifactDownloaded {
            package: package.identifier.clone(),
            version: release.version().to_string(),
            bytes,
            sha256,
        });

        ensure_not_cancelled(cancel, UpgradeStep::Extract)?;
        let staged_root = self.stage(&archive, &staging.path().join(UNPACK_DIR)).await?;
        tokio::fs::write(
            staged_root.join(VERSION_MARKER),
            format!("{}\n", release.version()),
        )
        .await
        .map_err(|e| UpdaterError::Extract(format!("Failed to write version marker: {e}")))?;

        ensure_not_cancelled(cancel, UpgradeStep::Move)?;
        self.swap(&staged_root, destination, staging)?;

        // The new release is in place from here on; enabling always runs
        if !package.was_enabled {
            return Ok(None);
        }
        match self.host.enable(&package.identifier, destination) {
            Ok(()) => Ok(None),
            Err(e) => Ok(Some(e)),
        }
    }

    /// Stream the artifact to `path`, returning its size and SHA256
    async fn download(&self, url: &Url, path: &Path) -> Result<(u64, String)> {
        tracing::debug!("Downloading {}", redact_token(url));

        let response = tokio::time::timeout(self.read_timeout, self.http.get(url.clone()).send())
            .await
            .map_err(|_| {
                UpdaterError::Download(format!("No response within {:?}", self.read_timeout))
            })?
            .map_err(|e| UpdaterError::Download(format!("Request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(UpdaterError::Download(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| UpdaterError::Download(format!("Failed to create {}: {e}", path.display())))?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(self.read_timeout, stream.next())
                .await
                .map_err(|_| {
                    UpdaterError::Download(format!(
                        "Download stalled, no data for {:?}",
                        self.read_timeout
                    ))
                })?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| {
                UpdaterError::Download(format!("Failed to read body: {}", e.without_url()))
            })?;
            hasher.update(&chunk);
            size += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| UpdaterError::Download(format!("Failed to write artifact: {e}")))?;
        }
        file.sync_all()
            .await
            .map_err(|e| UpdaterError::Download(format!("Failed to write artifact: {e}")))?;

        if size == 0 {
            return Err(UpdaterError::Download("artifact is empty".to_string()));
        }

        Ok((size, format!("{:x}", hasher.finalize())))
    }

    async fn stage(&self, archive: &Path, unpack_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir(unpack_dir)
            .await
            .map_err(|e| UpdaterError::Extract(format!("Failed to create {}: {e}", unpack_dir.display())))?;

        let unpacker = Arc::clone(&self.unpacker);
        let archive = archive.to_path_buf();
        let unpack_dir = unpack_dir.to_path_buf();
        tokio::task::spawn_blocking(move || unpacker.unpack(&archive, &unpack_dir))
            .await
            .map_err(|e| UpdaterError::Extract(format!("Extraction task failed: {e}")))?
    }

    /// Replace `destination` with `staged_root`, or leave it untouched.
    ///
    /// Consumes the staging directory: the previous install ends up inside it
    /// and is deleted with it on success.
    fn swap(&self, staged_root: &Path, destination: &Path, staging: TempDir) -> Result<()> {
        let previous = staging.path().join(PREVIOUS_DIR);
        let had_previous = self.fs.exists(destination);

        if had_previous {
            self.fs.rename(destination, &previous).map_err(|e| {
                UpdaterError::Move(format!(
                    "Failed to move {} aside: {e}",
                    destination.display()
                ))
            })?;
        }

        if let Err(e) = self.fs.rename(staged_root, destination) {
            if had_previous && let Err(restore_err) = self.fs.rename(&previous, destination) {
                // Keep the only copy of the old install on disk
                let kept = staging.keep().join(PREVIOUS_DIR);
                tracing::error!(
                    "Failed to restore {}: {restore_err}. Previous install kept at {}",
                    destination.display(),
                    kept.display()
                );
                return Err(UpdaterError::Move(format!(
                    "Failed to install into {}: {e}; restoring the previous install also failed, it is kept at {}",
                    destination.display(),
                    kept.display()
                )));
            }
            return Err(UpdaterError::Move(format!(
                "Failed to install into {}: {e}",
                destination.display()
            )));
        }

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            tracing::warn!("Failed to remove staging {}: {e}", staging_path.display());
        }
        Ok(())
    }
}

fn create_staging(destination: &Path) -> Result<TempDir> {
    let parent = parent_dir(destination);
    let name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("package");

    std::fs::create_dir_all(parent)
        .map_err(|e| UpdaterError::Download(format!("Failed to create {}: {e}", parent.display())))?;
    tempfile::Builder::new()
        .prefix(&format!(".{name}-staging-"))
        .tempdir_in(parent)
        .map_err(|e| {
            UpdaterError::Download(format!(
                "Failed to create staging directory in {}: {e}",
                parent.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testing::zip_bytes;
    use crate::fs::testing::FailingFs;
    use crate::host::testing::MemoryHost;
    use mockito::{Matcher, Server, ServerGuard};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ZIPBALL_PATH: &str = "/repos/acme/lazy-load/zipball/1.1.0";

    struct Fixture {
        dir: TempDir,
        destination: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let destination = dir.path().join("plugins").join("lazy-load");
            std::fs::create_dir_all(destination.join("assets")).unwrap();
            std::fs::write(destination.join("lazy-load.php"), "<?php // 1.0.0").unwrap();
            std::fs::write(destination.join("assets/app.js"), "old()").unwrap();
            std::fs::write(destination.join(VERSION_MARKER), "1.0.0\n").unwrap();
            Self { dir, destination }
        }

        fn package(&self, was_enabled: bool) -> InstalledPackage {
            InstalledPackage {
                identifier: "lazy-load".to_string(),
                current_version: "1.0.0".to_string(),
                install_path: self.destination.clone(),
                was_enabled,
            }
        }

        fn plugins_dir(&self) -> PathBuf {
            self.dir.path().join("plugins")
        }
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    let rel = path.strip_prefix(root).unwrap().to_path_buf();
                    out.insert(rel, std::fs::read(&path).unwrap());
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(root, root, &mut out);
        out
    }

    fn release(server: &ServerGuard) -> ReleaseInfo {
        ReleaseInfo {
            tag: "v1.1.0".to_string(),
            published_at: None,
            notes_body: String::new(),
            artifact_url: format!("{}{ZIPBALL_PATH}", server.url()),
        }
    }

    fn zipball() -> Vec<u8> {
        zip_bytes(&[
            ("acme-lazy-load-9f8e7d/lazy-load.php", b"<?php // 1.1.0"),
            ("acme-lazy-load-9f8e7d/assets/app.js", b"new()"),
        ])
    }

    fn executor(fs: Arc<dyn PackageFs>, host: Arc<MemoryHost>) -> UpgradeExecutor {
        UpgradeExecutor::new(reqwest::Client::new(), fs, host, Arc::new(ZipUnpacker))
    }

    /// Unpacks normally, then cancels `cancel` as if Ctrl-C arrived right after
    #[derive(Debug)]
    struct CancellingUnpacker {
        cancel: CancellationToken,
        calls: AtomicUsize,
    }

    impl CancellingUnpacker {
        fn new(cancel: &CancellationToken) -> Self {
            Self {
                cancel: cancel.clone(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Unpacker for CancellingUnpacker {
        fn unpack(&self, archive: &Path, into: &Path) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let root = ZipUnpacker.unpack(archive, into)?;
            self.cancel.cancel();
            Ok(root)
        }
    }

    fn lock_is_free(destination: &Path) -> bool {
        InstallLock::try_acquire(destination).unwrap().is_some()
    }

    fn leftovers(plugins_dir: &Path) -> Vec<String> {
        std::fs::read_dir(plugins_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains("-staging-"))
            .collect()
    }

    #[tokio::test]
    async fn test_apply_installs_release() {
        let fixture = Fixture::new();
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_header("content-type", "application/zip")
            .with_body(zipball())
            .create_async()
            .await;
        let host = Arc::new(MemoryHost::new("1.0.0", true));

        let result = executor(Arc::new(LocalFs), Arc::clone(&host))
            .apply(
                &release(&server),
                &fixture.package(true),
                None,
                &CancellationToken::new(),
            )
            .await;

        match result {
            UpgradeResult::Applied {
                ref version,
                enable_error: None,
            } => assert_eq!(version, "1.1.0"),
            ref other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            std::fs::read_to_string(fixture.destination.join("lazy-load.php")).unwrap(),
            "<?php // 1.1.0"
        );
        assert_eq!(
            std::fs::read_to_string(fixture.destination.join("assets/app.js")).unwrap(),
            "new()"
        );
        assert_eq!(
            std::fs::read_to_string(fixture.destination.join(VERSION_MARKER)).unwrap(),
            "1.1.0\n"
        );
        assert_eq!(
            *host.enabled_paths.lock().unwrap(),
            vec![fixture.destination.clone()]
        );
        assert!(leftovers(&fixture.plugins_dir()).is_empty());
        assert!(lock_is_free(&fixture.destination));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_apply_fresh_install() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("plugins").join("lazy-load");
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_body(zipball())
            .create_async()
            .await;
        let package = InstalledPackage {
            identifier: "lazy-load".to_string(),
            current_version: "0.0.0".to_string(),
            install_path: destination.clone(),
            was_enabled: false,
        };
        let host = Arc::new(MemoryHost::new("0.0.0", false));

        let result = executor(Arc::new(LocalFs), Arc::clone(&host))
            .apply(&release(&server), &package, None, &CancellationToken::new())
            .await;

        assert!(result.is_applied());
        assert!(destination.join("lazy-load.php").is_file());
        assert!(host.enabled_paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_move_failure_leaves_destination_untouched() {
        let fixture = Fixture::new();
        let before = snapshot(&fixture.destination);
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_body(zipball())
            .create_async()
            .await;
        let host = Arc::new(MemoryHost::new("1.0.0", true));
        let fs = Arc::new(FailingFs::new(&fixture.destination, 1));

        let result = executor(fs, Arc::clone(&host))
            .apply(
                &release(&server),
                &fixture.package(true),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, UpgradeResult::Failed(UpdaterError::Move(_))));
        assert_eq!(result.failed_step(), Some(UpgradeStep::Move));
        assert!(result.to_string().contains("move"));
        assert_eq!(snapshot(&fixture.destination), before);
        assert!(host.enabled_paths.lock().unwrap().is_empty());
        assert!(leftovers(&fixture.plugins_dir()).is_empty());
        assert!(lock_is_free(&fixture.destination));
    }

    #[tokio::test]
    async fn test_apply_failed_restore_keeps_previous_install() {
        let fixture = Fixture::new();
        let before = snapshot(&fixture.destination);
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_body(zipball())
            .create_async()
            .await;
        let fs = Arc::new(FailingFs::new(&fixture.destination, 2));

        let result = executor(fs, Arc::new(MemoryHost::new("1.0.0", true)))
            .apply(
                &release(&server),
                &fixture.package(true),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.failed_step(), Some(UpgradeStep::Move));
        let kept = leftovers(&fixture.plugins_dir());
        assert_eq!(kept.len(), 1);
        let previous = fixture.plugins_dir().join(&kept[0]).join(PREVIOUS_DIR);
        assert_eq!(snapshot(&previous), before);
    }

    #[tokio::test]
    async fn test_apply_enable_failure_is_partial_success() {
        let fixture = Fixture::new();
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_body(zipball())
            .create_async()
            .await;

        let result = executor(
            Arc::new(LocalFs),
            Arc::new(MemoryHost::failing_enable("1.0.0")),
        )
        .apply(
            &release(&server),
            &fixture.package(true),
            None,
            &CancellationToken::new(),
        )
        .await;

        match result {
            UpgradeResult::Applied {
                ref version,
                enable_error: Some(UpdaterError::Enable(_)),
            } => assert_eq!(version, "1.1.0"),
            ref other => panic!("unexpected result: {other:?}"),
        }
        assert!(result.failed_step().is_none());
        assert!(result.to_string().contains("inactive"));
        assert!(fixture.destination.join("lazy-load.php").is_file());
        assert_eq!(
            std::fs::read_to_string(fixture.destination.join(VERSION_MARKER)).unwrap(),
            "1.1.0\n"
        );
    }

    #[tokio::test]
    async fn test_apply_download_failure() {
        let fixture = Fixture::new();
        let before = snapshot(&fixture.destination);
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(502)
            .create_async()
            .await;

        let result = executor(Arc::new(LocalFs), Arc::new(MemoryHost::new("1.0.0", true)))
            .apply(
                &release(&server),
                &fixture.package(true),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            result,
            UpgradeResult::Failed(UpdaterError::Download(_))
        ));
        assert_eq!(snapshot(&fixture.destination), before);
        assert!(leftovers(&fixture.plugins_dir()).is_empty());
        assert!(lock_is_free(&fixture.destination));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_apply_stalled_download_times_out() {
        let fixture = Fixture::new();
        let before = snapshot(&fixture.destination);
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_chunked_body(|w| {
                std::io::Write::write_all(w, b"PK")?;
                std::io::Write::flush(w)?;
                std::thread::sleep(std::time::Duration::from_secs(2));
                Ok(())
            })
            .create_async()
            .await;

        let started = Instant::now();
        let result = executor(Arc::new(LocalFs), Arc::new(MemoryHost::new("1.0.0", true)))
            .with_read_timeout(Duration::from_millis(200))
            .apply(
                &release(&server),
                &fixture.package(true),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.failed_step(), Some(UpgradeStep::Download));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(snapshot(&fixture.destination), before);
        assert!(leftovers(&fixture.plugins_dir()).is_empty());
        assert!(lock_is_free(&fixture.destination));
    }

    #[tokio::test]
    async fn test_apply_corrupt_artifact() {
        let fixture = Fixture::new();
        let before = snapshot(&fixture.destination);
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_body("not a zip at all")
            .create_async()
            .await;

        let result = executor(Arc::new(LocalFs), Arc::new(MemoryHost::new("1.0.0", true)))
            .apply(
                &release(&server),
                &fixture.package(true),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.failed_step(), Some(UpgradeStep::Extract));
        assert_eq!(snapshot(&fixture.destination), before);
    }

    #[tokio::test]
    async fn test_apply_sends_token_with_download() {
        let fixture = Fixture::new();
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", ZIPBALL_PATH)
            .match_query(Matcher::UrlEncoded(
                "access_token".to_string(),
                "secret".to_string(),
            ))
            .with_status(200)
            .with_body(zipball())
            .create_async()
            .await;

        let result = executor(Arc::new(LocalFs), Arc::new(MemoryHost::new("1.0.0", false)))
            .apply(
                &release(&server),
                &fixture.package(false),
                Some("secret"),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.is_applied());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_apply_cancelled_before_download() {
        let fixture = Fixture::new();
        let before = snapshot(&fixture.destination);
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_body(zipball())
            .expect(0)
            .create_async()
            .await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor(Arc::new(LocalFs), Arc::new(MemoryHost::new("1.0.0", true)))
            .apply(&release(&server), &fixture.package(true), None, &cancel)
            .await;

        assert!(matches!(
            result,
            UpgradeResult::Failed(UpdaterError::Cancelled {
                before: UpgradeStep::Download
            })
        ));
        assert_eq!(result.failed_step(), Some(UpgradeStep::Cancelled));
        assert_eq!(snapshot(&fixture.destination), before);
        assert!(lock_is_free(&fixture.destination));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_apply_cancelled_before_extract() {
        let fixture = Fixture::new();
        let before = snapshot(&fixture.destination);
        let cancel = CancellationToken::new();
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_body_from_request({
                let cancel = cancel.clone();
                move |_| {
                    cancel.cancel();
                    zipball()
                }
            })
            .expect(1)
            .create_async()
            .await;
        let host = Arc::new(MemoryHost::new("1.0.0", true));
        let unpacker = Arc::new(CancellingUnpacker::new(&cancel));

        let result = UpgradeExecutor::new(
            reqwest::Client::new(),
            Arc::new(LocalFs),
            Arc::clone(&host) as Arc<dyn Host>,
            Arc::clone(&unpacker) as Arc<dyn Unpacker>,
        )
        .apply(&release(&server), &fixture.package(true), None, &cancel)
        .await;

        assert!(matches!(
            result,
            UpgradeResult::Failed(UpdaterError::Cancelled {
                before: UpgradeStep::Extract
            })
        ));
        assert_eq!(result.failed_step(), Some(UpgradeStep::Cancelled));
        assert_eq!(unpacker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(snapshot(&fixture.destination), before);
        assert!(leftovers(&fixture.plugins_dir()).is_empty());
        assert!(host.enabled_paths.lock().unwrap().is_empty());
        assert!(lock_is_free(&fixture.destination));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_apply_cancelled_before_move() {
        let fixture = Fixture::new();
        let before = snapshot(&fixture.destination);
        let cancel = CancellationToken::new();
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", ZIPBALL_PATH)
            .with_status(200)
            .with_body(zipball())
            .create_async()
            .await;
        let host = Arc::new(MemoryHost::new("1.0.0", true));
        let unpacker = Arc::new(CancellingUnpacker::new(&cancel));

        let result = UpgradeExecutor::new(
            reqwest::Client::new(),
            Arc::new(LocalFs),
            Arc::clone(&host) as Arc<dyn Host>,
            Arc::clone(&unpacker) as Arc<dyn Unpacker>,
        )
        .apply(&release(&server), &fixture.package(true), None, &cancel)
        .await;

        assert!(matches!(
            result,
            UpgradeResult::Failed(UpdaterError::Cancelled {
                before: UpgradeStep::Move
            })
        ));
        // Not reported as a failed rename
        assert_eq!(result.failed_step(), Some(UpgradeStep::Cancelled));
        assert_eq!(result.to_string(), "upgrade failed: cancelled before move");
        assert_eq!(unpacker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot(&fixture.destination), before);
        assert!(leftovers(&fixture.plugins_dir()).is_empty());
        assert!(host.enabled_paths.lock().unwrap().is_empty());
        assert!(lock_is_free(&fixture.destination));
    }

    #[test]
    fn test_failed_event_step_name() {
        let cancelled = UpdaterError::Cancelled {
            before: UpgradeStep::Move,
        };
        assert_eq!(step_name(&cancelled), "cancelled");
        assert_eq!(step_name(&UpdaterError::Move("busy".to_string())), "move");
        assert_eq!(step_name(&UpdaterError::Network("down".to_string())), "unknown step");
    }

    #[test]
    fn test_result_display() {
        let applied = UpgradeResult::Applied {
            version: "1.1.0".to_string(),
            enable_error: None,
        };
        assert_eq!(applied.to_string(), "upgraded to 1.1.0");
        assert_eq!(UpgradeResult::NotNeeded.to_string(), "already up to date");

        let failed = UpgradeResult::Failed(UpdaterError::Download("status 502".to_string()));
        assert_eq!(
            failed.to_string(),
            "upgrade failed: download: status 502"
        );
    }
}
