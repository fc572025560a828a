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

//! Plugin Updater - self-update for a plugin distributed through GitHub Releases
//!
//! Looks up the newest release of a repository, decides whether it is newer
//! than the installed copy, and swaps the install directory for the
//! release's zipball without ever leaving a half-written package behind.

pub mod archive;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod fs;
pub mod hints;
pub mod host;
pub mod lock;
pub mod orchestrator;
pub mod release_client;
pub mod version;

pub use config::{UpdaterConfig, load_config, save_config};
pub use error::{UpdaterError, UpgradeStep};
pub use executor::{InstalledPackage, UpgradeExecutor, UpgradeResult};
pub use host::{Host, LocalHost};
pub use orchestrator::{ReleaseDetails, UpdateCheck, UpdateCycle, UpdateOffer, UpdateOrchestrator};
pub use release_client::{ReleaseClient, ReleaseInfo, RepoId};
pub use version::{VersionOrdering, compare, is_newer, parse_version, version_from_tag};
