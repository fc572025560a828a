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

//! Error types for the updater crate

use std::fmt;
use thiserror::Error;

/// Step of an upgrade that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStep {
    Lock,
    Download,
    Extract,
    Move,
    Enable,
    /// Stopped on request between steps
    Cancelled,
}

impl fmt::Display for UpgradeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lock => "lock",
            Self::Download => "download",
            Self::Extract => "extract",
            Self::Move => "move",
            Self::Enable => "enable",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("release not found: {0}")]
    NotFound(String),

    #[error("host error: {0}")]
    Host(String),

    #[error("lock: {0}")]
    Lock(String),

    #[error("download: {0}")]
    Download(String),

    #[error("extract: {0}")]
    Extract(String),

    #[error("move: {0}")]
    Move(String),

    #[error("enable: {0}")]
    Enable(String),

    #[error("cancelled before {before}")]
    Cancelled { before: UpgradeStep },
}

impl UpdaterError {
    /// Upgrade step this error originated from, if it came from the executor
    pub fn step(&self) -> Option<UpgradeStep> {
        match self {
            Self::Lock(_) => Some(UpgradeStep::Lock),
            Self::Download(_) => Some(UpgradeStep::Download),
            Self::Extract(_) => Some(UpgradeStep::Extract),
            Self::Move(_) => Some(UpgradeStep::Move),
            Self::Enable(_) => Some(UpgradeStep::Enable),
            Self::Cancelled { .. } => Some(UpgradeStep::Cancelled),
            Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Network(_)
            | Self::Parse(_)
            | Self::NotFound(_)
            | Self::Host(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
