//! Asset discovery: the allow-list and the source/destination inventories.
//!
//! Sources are found recursively under the content root; destinations are the
//! files directly inside the flat destination directory. Both are filtered by
//! the same [`AllowList`] and rediscovered on every pass.

use crate::log;
use rustc_hash::FxHashSet;
use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};
use walkdir::WalkDir;

// ============================================================================
// Allow-list
// ============================================================================

/// Set of file extensions eligible for synchronization.
///
/// Extensions are stored lower-cased without the leading dot and matched
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    extensions: FxHashSet<String>,
}

impl AllowList {
    /// Build an allow-list from extensions such as `"png"` or `".SVG"`.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    /// The default image formats: png, jpg, jpeg, svg, gif, webp, avif.
    pub fn images() -> Self {
        Self::new(crate::config::defaults::sync::IMAGE_EXTENSIONS)
    }

    /// Returns true if the path's extension is allow-listed.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }
}

// ============================================================================
// Inventories
// ============================================================================

/// An allow-listed file found under the content root.
#[derive(Debug, Clone)]
pub struct SourceAsset {
    /// File name, the key into the flat destination.
    pub name: OsString,
    pub path: PathBuf,
    pub modified: SystemTime,
    /// Lower-cased extension.
    pub extension: String,
}

/// An allow-listed file directly inside the destination directory.
#[derive(Debug, Clone)]
pub struct DestinationAsset {
    pub name: OsString,
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl SourceAsset {
    pub fn display_name(&self) -> Cow<'_, str> {
        self.name.to_string_lossy()
    }
}

impl DestinationAsset {
    pub fn display_name(&self) -> Cow<'_, str> {
        self.name.to_string_lossy()
    }
}

/// Collect allow-listed files under `root`, recursively.
///
/// Entries are visited in file-name order so that name collisions resolve
/// the same way on every run. Unreadable entries are logged and skipped; a
/// missing root yields no sources. The `destination` subtree is skipped when
/// it sits inside `root`, so copies are never read back as sources.
pub fn collect_sources(root: &Path, allow: &AllowList, destination: &Path) -> Vec<SourceAsset> {
    if !root.exists() {
        log!("sync"; "content root {} does not exist", root.display());
        return Vec::new();
    }

    let skip = (!root.starts_with(destination)).then_some(destination);

    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| skip.is_none_or(|dest| !entry.path().starts_with(dest)))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log!("warn"; "skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && allow.matches(entry.path()))
        .filter_map(|entry| {
            let path = entry.into_path();
            let modified = match modified_time(&path) {
                Ok(time) => time,
                Err(e) => {
                    log!("warn"; "cannot stat {}: {e}", path.display());
                    return None;
                }
            };
            let name = path.file_name()?.to_owned();
            let extension = path
                .extension()
                .and_then(OsStr::to_str)
                .unwrap_or_default()
                .to_ascii_lowercase();
            Some(SourceAsset {
                name,
                path,
                modified,
                extension,
            })
        })
        .collect()
}

/// Collect allow-listed files directly inside `dir` (non-recursive).
///
/// A missing directory is an empty set. Any other read failure is logged and
/// also treated as an empty set.
pub fn collect_destination(dir: &Path, allow: &AllowList) -> Vec<DestinationAsset> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log!("warn"; "could not read destination {}: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut assets: Vec<_> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log!("warn"; "skipping unreadable entry in {}: {e}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.path())
        .filter(|path| allow.matches(path))
        .filter_map(|path| {
            let modified = match modified_time(&path) {
                Ok(time) => time,
                Err(e) => {
                    log!("warn"; "cannot stat {}: {e}", path.display());
                    return None;
                }
            };
            Some(DestinationAsset {
                name: path.file_name()?.to_owned(),
                path,
                modified,
            })
        })
        .collect();

    assets.sort_by(|a, b| a.name.cmp(&b.name));
    assets
}

fn modified_time(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}
