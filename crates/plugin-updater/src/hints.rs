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

//! Compatibility hints embedded in release notes
//!
//! Release authors can state host compatibility in free text, e.g.
//!
//! ```text
//! Requires: 5.2
//! Tested: 5.8
//! ```
//!
//! These are advisory. Nothing in this crate refuses an upgrade because of them.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static REQUIRES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)requires:\s*v?(\d+(?:\.\d+)*)").expect("requires pattern compiles")
});
static TESTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)tested:\s*v?(\d+(?:\.\d+)*)").expect("tested pattern compiles")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompatibilityHints {
    /// Lowest host version the release claims to need (`requires:`)
    pub min_host_version: Option<String>,
    /// Highest host version the release was tested on (`tested:`)
    pub max_host_version: Option<String>,
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Scan release notes for `requires:` and `tested:` directives. First match wins.
pub fn extract_hints(notes_body: &str) -> CompatibilityHints {
    CompatibilityHints {
        min_host_version: first_capture(&REQUIRES, notes_body),
        max_host_version: first_capture(&TESTED, notes_body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert_eq!(REQUIRES.captures_len(), 2);
        assert_eq!(TESTED.captures_len(), 2);
    }

    #[test]
    fn test_both_hints_extracted() {
        let hints = extract_hints("Requires: 5.2\nTested: 5.8");
        assert_eq!(hints.min_host_version.as_deref(), Some("5.2"));
        assert_eq!(hints.max_host_version.as_deref(), Some("5.8"));
    }

    #[test]
    fn test_hints_are_independent() {
        let hints = extract_hints("Requires: 5.2");
        assert_eq!(hints.min_host_version.as_deref(), Some("5.2"));
        assert!(hints.max_host_version.is_none());

        let hints = extract_hints("tested: 6.1.1");
        assert!(hints.min_host_version.is_none());
        assert_eq!(hints.max_host_version.as_deref(), Some("6.1.1"));
    }

    #[test]
    fn test_case_insensitive_first_match_wins() {
        let body = "## Changes\n- faster lazy loading\n\nREQUIRES: 4.9\nrequires: 5.0\nTESTED:  5.5.";
        let hints = extract_hints(body);
        assert_eq!(hints.min_host_version.as_deref(), Some("4.9"));
        // Trailing sentence dot is not part of the version
        assert_eq!(hints.max_host_version.as_deref(), Some("5.5"));
    }

    #[test]
    fn test_no_hints() {
        let hints = extract_hints("Bug fixes only.\nRequires a cache flush after upgrade.");
        assert_eq!(hints, CompatibilityHints::default());
        assert_eq!(extract_hints(""), CompatibilityHints::default());
    }
}
