//! Deciding whether a copy pass is needed.
//!
//! A pass is required when the flattened source set and the destination set
//! differ in size, when a source has no destination counterpart, or when a
//! source is strictly newer than its counterpart. Checks stop at the first
//! reason found.

use super::discover::{DestinationAsset, SourceAsset};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::{ffi::OsStr, fmt};

/// Outcome of comparing sources against the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SyncDecision {
    /// The content tree holds no allow-listed files.
    NoSources,
    /// Every source is mirrored and not newer than its copy.
    UpToDate,
    /// Different number of distinct names on each side.
    CountMismatch { source: usize, destination: usize },
    /// A source has no destination file of the same name.
    Missing { name: String },
    /// A source was modified after its destination copy.
    Newer { name: String },
}

impl SyncDecision {
    pub const fn needs_copy(&self) -> bool {
        matches!(
            self,
            Self::CountMismatch { .. } | Self::Missing { .. } | Self::Newer { .. }
        )
    }
}

impl fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSources => write!(f, "no source images found"),
            Self::UpToDate => write!(f, "all files up to date"),
            Self::CountMismatch {
                source,
                destination,
            } => write!(f, "file count mismatch ({source} source, {destination} destination)"),
            Self::Missing { name } => write!(f, "missing destination file: {name}"),
            Self::Newer { name } => write!(f, "source file newer: {name}"),
        }
    }
}

/// Compare the flattened source mirror against the destination inventory.
///
/// `sources` must already be flattened: one entry per file name.
pub fn decide(sources: &[&SourceAsset], destination: &[DestinationAsset]) -> SyncDecision {
    if sources.is_empty() {
        return SyncDecision::NoSources;
    }

    if sources.len() != destination.len() {
        return SyncDecision::CountMismatch {
            source: sources.len(),
            destination: destination.len(),
        };
    }

    let existing: FxHashMap<&OsStr, &DestinationAsset> = destination
        .iter()
        .map(|asset| (asset.name.as_os_str(), asset))
        .collect();

    for source in sources {
        match existing.get(source.name.as_os_str()) {
            None => {
                return SyncDecision::Missing {
                    name: source.display_name().into_owned(),
                };
            }
            Some(dest) if source.modified > dest.modified => {
                return SyncDecision::Newer {
                    name: source.display_name().into_owned(),
                };
            }
            Some(_) => {}
        }
    }

    SyncDecision::UpToDate
}
