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

//! Entry points a host calls: check for an update, perform the upgrade
//!
//! Every call starts from a fresh release lookup. Calls made through one
//! [`UpdateCycle`] share the release fetched first in that cycle.

use crate::config::UpdaterConfig;
use crate::error::Result;
use crate::executor::{InstalledPackage, UpgradeExecutor, UpgradeResult};
use crate::hints::{CompatibilityHints, extract_hints};
use crate::host::{Host, PackageMetadata};
use crate::release_client::{ReleaseClient, ReleaseInfo, RepoId};
use crate::version::{self, VersionOrdering};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Entry a host lists in its "updates available" screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOffer {
    pub slug: String,
    pub package_file: String,
    pub new_version: String,
    /// Releases page of the repository
    pub url: String,
    /// Artifact URL, without credentials
    pub package: String,
    pub tested: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateCheck {
    pub available: bool,
    pub installed_version: String,
    pub latest_version: String,
    /// Latest release relative to the installed version
    pub ordering: VersionOrdering,
    pub info: Option<ReleaseInfo>,
    pub hints: Option<CompatibilityHints>,
    pub offer: Option<UpdateOffer>,
}

/// What a host shows in its package details dialog
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseDetails {
    pub slug: String,
    pub name: String,
    pub author: Option<String>,
    pub homepage: Option<String>,
    pub installed_version: String,
    pub version: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub download_link: String,
    pub hints: CompatibilityHints,
    pub notes: String,
}

pub struct UpdateOrchestrator {
    repo: RepoId,
    package_id: String,
    package_file: String,
    install_path: PathBuf,
    auth_token: Option<String>,
    default_tested: Option<String>,
    client: ReleaseClient,
    executor: UpgradeExecutor,
    host: Arc<dyn Host>,
    cancel: CancellationToken,
}

impl fmt::Debug for UpdateOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateOrchestrator")
            .field("repo", &self.repo)
            .field("package_id", &self.package_id)
            .field("install_path", &self.install_path)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl UpdateOrchestrator {
    /// Orchestrator on the local filesystem with the default zipball unpacker
    pub fn new(config: &UpdaterConfig, host: Arc<dyn Host>) -> Result<Self> {
        let client = ReleaseClient::from_config(config)?;
        let executor = UpgradeExecutor::local(client.http().clone(), Arc::clone(&host))
            .with_read_timeout(Duration::from_secs(config.request_timeout_secs));
        Self::with_components(config, client, executor, host)
    }

    pub fn with_components(
        config: &UpdaterConfig,
        client: ReleaseClient,
        executor: UpgradeExecutor,
        host: Arc<dyn Host>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            repo: config.repo_id(),
            package_id: config.slug()?,
            package_file: config.package_file()?,
            install_path: config.install_dir.clone(),
            auth_token: config.access_token.clone(),
            default_tested: config.default_tested.clone(),
            client,
            executor,
            host,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `cancel` to stop upgrades between steps
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    /// Start a cycle whose calls share one release lookup
    pub fn begin_cycle(&self) -> UpdateCycle<'_> {
        UpdateCycle {
            orchestrator: self,
            release: OnceCell::new(),
        }
    }

    pub async fn check_for_update(&self) -> Result<UpdateCheck> {
        self.begin_cycle().check_for_update().await
    }

    pub async fn perform_upgrade(&self) -> Result<UpgradeResult> {
        self.begin_cycle().perform_upgrade().await
    }

    pub async fn release_details(&self, slug: &str) -> Result<Option<ReleaseDetails>> {
        self.begin_cycle().release_details(slug).await
    }

    fn installed(&self) -> Result<(PackageMetadata, InstalledPackage)> {
        let metadata = self.host.package_metadata(&self.package_id)?;
        let package = InstalledPackage {
            identifier: self.package_id.clone(),
            current_version: metadata.version.clone(),
            install_path: self.install_path.clone(),
            was_enabled: false,
        };
        Ok((metadata, package))
    }

    fn offer(&self, release: &ReleaseInfo, hints: &CompatibilityHints) -> UpdateOffer {
        UpdateOffer {
            slug: self.package_id.clone(),
            package_file: self.package_file.clone(),
            new_version: release.tag.clone(),
            url: self.repo.releases_page(),
            package: release.artifact_url.clone(),
            tested: hints
                .max_host_version
                .clone()
                .or_else(|| self.default_tested.clone()),
        }
    }
}

/// One logical check/upgrade pass
#[derive(Debug)]
pub struct UpdateCycle<'a> {
    orchestrator: &'a UpdateOrchestrator,
    release: OnceCell<ReleaseInfo>,
}

impl UpdateCycle<'_> {
    /// Latest release, fetched on first use within this cycle
    pub async fn release(&self) -> Result<&ReleaseInfo> {
        let orchestrator = self.orchestrator;
        self.release
            .get_or_try_init(|| {
                orchestrator
                    .client
                    .fetch_latest(&orchestrator.repo, orchestrator.auth_token.as_deref())
            })
            .await
    }

    /// Report whether the latest release is newer than the install. No side effects.
    pub async fn check_for_update(&self) -> Result<UpdateCheck> {
        let release = self.release().await?;
        let (_, installed) = self.orchestrator.installed()?;
        let ordering = version::compare(release.version(), &installed.current_version);
        log_ordering(&installed.current_version, &release.tag, ordering);

        let available = ordering == VersionOrdering::Newer;
        let (info, hints, offer) = if available {
            let hints = extract_hints(&release.notes_body);
            let offer = self.orchestrator.offer(release, &hints);
            (Some(release.clone()), Some(hints), Some(offer))
        } else {
            (None, None, None)
        };

        Ok(UpdateCheck {
            available,
            installed_version: installed.current_version,
            latest_version: release.tag.clone(),
            ordering,
            info,
            hints,
            offer,
        })
    }

    /// Install the latest release if it is newer than the install
    pub async fn perform_upgrade(&self) -> Result<UpgradeResult> {
        let release = self.release().await?;
        let (_, mut package) = self.orchestrator.installed()?;

        if !version::is_newer(&package.current_version, release.version()) {
            log_ordering(
                &package.current_version,
                &release.tag,
                version::compare(release.version(), &package.current_version),
            );
            return Ok(UpgradeResult::NotNeeded);
        }

        package.was_enabled = self.orchestrator.host.is_enabled(&package.identifier)?;
        let orchestrator = self.orchestrator;
        Ok(orchestrator
            .executor
            .apply(
                release,
                &package,
                orchestrator.auth_token.as_deref(),
                &orchestrator.cancel,
            )
            .await)
    }

    /// Details for `slug`, or `None` if it is not this package
    pub async fn release_details(&self, slug: &str) -> Result<Option<ReleaseDetails>> {
        if slug != self.orchestrator.package_id {
            return Ok(None);
        }

        let release = self.release().await?;
        let (metadata, _) = self.orchestrator.installed()?;
        Ok(Some(ReleaseDetails {
            slug: slug.to_string(),
            name: metadata.name,
            author: metadata.author,
            homepage: metadata.homepage,
            installed_version: metadata.version,
            version: release.tag.clone(),
            last_updated: release.published_at,
            download_link: release.artifact_url.clone(),
            hints: extract_hints(&release.notes_body),
            notes: release.notes_body.clone(),
        }))
    }
}

fn log_ordering(installed: &str, latest: &str, ordering: VersionOrdering) {
    match ordering {
        VersionOrdering::Newer => tracing::info!("Update available: {installed} -> {latest}"),
        VersionOrdering::Same => tracing::debug!("Up to date at {installed}"),
        VersionOrdering::Older => tracing::warn!(
            "Installed {installed} is newer than latest release {latest}, not downgrading"
        ),
        VersionOrdering::Unknown => tracing::warn!(
            "Cannot compare installed {installed:?} with release {latest:?}, not updating"
        ),
    }
}
