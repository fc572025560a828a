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

//! Version parsing and comparison module

use serde::Serialize;
use std::cmp::Ordering;

/// Outcome of comparing two version strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrdering {
    Newer,
    Same,
    Older,
    /// One of the inputs is not a version
    Unknown,
}

impl From<Ordering> for VersionOrdering {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Greater => Self::Newer,
            Ordering::Equal => Self::Same,
            Ordering::Less => Self::Older,
        }
    }
}

/// Parsed dotted version with optional pre-release identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub components: Vec<u64>,
    pub pre_release: Vec<String>,
}

/// Strip the leading "v" GitHub tags usually carry
pub fn version_from_tag(tag: &str) -> &str {
    tag.trim_start_matches('v').trim_start_matches('V')
}

/// Parse version strings like "1.2", "v0.2.38" or "2.0.0-beta.1+build5".
///
/// Returns `None` for anything that is not dotted numbers with an optional
/// pre-release suffix.
pub fn parse_version(s: &str) -> Option<Version> {
    let s = version_from_tag(s.trim());
    let s = s.split_once('+').map_or(s, |(version, _build)| version);
    let (core, pre) = match s.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (s, None),
    };

    let components = core
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                part.parse::<u64>().ok()
            }
        })
        .collect::<Option<Vec<u64>>>()?;

    let pre_release = match pre {
        None => Vec::new(),
        Some(pre) => {
            let identifiers: Vec<String> = pre.split('.').map(str::to_owned).collect();
            let valid = identifiers.iter().all(|id| {
                !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
            });
            if !valid {
                return None;
            }
            identifiers
        }
    };

    Some(Version {
        components,
        pre_release,
    })
}

fn compare_pre_release(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        // A release sorts above any of its pre-releases
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    for (x, y) in a.iter().zip(b) {
        let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Vec ordering is lexicographic and a strict prefix sorts first,
        // which gives 1.2 < 1.2.0 < 1.2.1
        self.components
            .cmp(&other.components)
            .then_with(|| compare_pre_release(&self.pre_release, &other.pre_release))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare `a` against `b`: `Newer` means `a` is the newer of the two.
pub fn compare(a: &str, b: &str) -> VersionOrdering {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a.cmp(&b).into(),
        _ => VersionOrdering::Unknown,
    }
}

/// Returns true only if `candidate` is strictly newer than `installed`.
///
/// Unparseable versions never count as newer.
pub fn is_newer(installed: &str, candidate: &str) -> bool {
    compare(candidate, installed) == VersionOrdering::Newer
}
