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

//! Structured upgrade events

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub enum UpgradeEvent {
    UpgradeStarted {
        package: String,
        from_version: String,
        to_version: String,
    },
    ArtifactDownloaded {
        package: String,
        version: String,
        bytes: u64,
        sha256: String,
    },
    UpgradeCompleted {
        package: String,
        from_version: String,
        to_version: String,
        duration_ms: u64,
    },
    UpgradeFailed {
        package: String,
        to_version: String,
        step: String,
        error: String,
    },
    EnableFailed {
        package: String,
        version: String,
        error: String,
    },
}

/// Log an upgrade event as a JSON line.
///
/// Never fails the upgrade: serialization problems are only logged.
pub fn report_event(event: &UpgradeEvent) {
    match serde_json::to_string(event) {
        Ok(event_json) => tracing::info!("Upgrade event: {event_json}"),
        Err(e) => tracing::warn!("Failed to serialize upgrade event {event:?}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_event_serialization() {
        let event = UpgradeEvent::UpgradeStarted {
            package: "lazy-load".to_string(),
            from_version: "1.0.0".to_string(),
            to_version: "1.1.0".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("UpgradeStarted"));
        assert!(json.contains("1.0.0"));
        assert!(json.contains("1.1.0"));
    }

    #[test]
    fn test_failed_event_names_step() {
        let event = UpgradeEvent::UpgradeFailed {
            package: "lazy-load".to_string(),
            to_version: "1.1.0".to_string(),
            step: "move".to_string(),
            error: "rename failed".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""step":"move""#));
    }

    #[test]
    fn test_report_event() {
        report_event(&UpgradeEvent::ArtifactDownloaded {
            package: "lazy-load".to_string(),
            version: "1.1.0".to_string(),
            bytes: 2048,
            sha256: "ab".repeat(32),
        });
    }
}
