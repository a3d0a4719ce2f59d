//! The synchronization pass.
//!
//! ```text
//! synchronize(source, destination, allow)
//!     │
//!     ├── collect_sources()       recursive, allow-listed
//!     ├── flatten()               one entry per file name, collisions recorded
//!     ├── collect_destination()   flat, allow-listed
//!     ├── decide()                count / missing / newer
//!     └── copy pass               best effort, per-file failures recorded
//!             └── prune           optional, removes orphans
//! ```
//!
//! Nothing in a pass is fatal: every failure is logged and recorded in the
//! returned [`SyncReport`].

use super::{
    decision::{SyncDecision, decide},
    discover::{AllowList, SourceAsset, collect_destination, collect_sources},
};
use crate::{config::ProjectConfig, log, session::Session};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::{
    error::Error as _,
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};
use thiserror::Error;

// ============================================================================
// Errors & Report
// ============================================================================

/// Per-file failures inside a pass. Recorded, never propagated.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to create destination `{0}`")]
    CreateDir(PathBuf, #[source] io::Error),

    #[error("failed to copy `{0}` to `{1}`")]
    Copy(PathBuf, PathBuf, #[source] io::Error),

    #[error("failed to remove `{0}`")]
    Remove(PathBuf, #[source] io::Error),
}

impl SyncError {
    fn path(&self) -> &Path {
        match self {
            Self::CreateDir(path, _) | Self::Copy(path, _, _) | Self::Remove(path, _) => path,
        }
    }
}

/// A failure as it appears in the report.
#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub path: PathBuf,
    pub error: String,
}

impl From<&SyncError> for SyncFailure {
    fn from(err: &SyncError) -> Self {
        let mut error = err.to_string();
        if let Some(source) = err.source() {
            error.push_str(": ");
            error.push_str(&source.to_string());
        }
        Self {
            path: err.path().to_path_buf(),
            error,
        }
    }
}

/// Several source files flattening onto the same destination name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub name: String,
    /// Every colliding source, in enumeration order.
    pub sources: Vec<PathBuf>,
    /// The source whose bytes end up in the destination (the last one).
    pub winner: PathBuf,
}

/// Result of one synchronization pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub decision: SyncDecision,
    pub destination: PathBuf,
    /// Distinct source file names.
    pub sources: usize,
    pub destinations: usize,
    pub copied: usize,
    pub failures: Vec<SyncFailure>,
    pub collisions: Vec<Collision>,
    pub pruned: Vec<PathBuf>,
}

impl SyncReport {
    fn new(decision: SyncDecision, destination: &Path) -> Self {
        Self {
            decision,
            destination: destination.to_path_buf(),
            sources: 0,
            destinations: 0,
            copied: 0,
            failures: Vec::new(),
            collisions: Vec::new(),
            pruned: Vec::new(),
        }
    }

    /// Whether a copy pass ran.
    pub const fn copy_executed(&self) -> bool {
        self.decision.needs_copy()
    }

    /// Whether the destination was modified.
    pub fn changed(&self) -> bool {
        self.copied > 0 || !self.pruned.is_empty()
    }

    fn record(&mut self, err: &SyncError) {
        log!("error"; "{}", SyncFailure::from(err).error);
        self.failures.push(err.into());
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Mirror allow-listed files from `source_root` (recursive) into the flat
/// `destination_root`, copying only when something is stale.
pub fn synchronize(source_root: &Path, destination_root: &Path, allow: &AllowList) -> SyncReport {
    AssetSync::new(source_root, destination_root, allow.clone()).run()
}

/// A configured synchronization: source root, destination, allow-list, prune policy.
#[derive(Debug, Clone)]
pub struct AssetSync {
    source: PathBuf,
    destination: PathBuf,
    allow: AllowList,
    prune: bool,
}

impl AssetSync {
    pub fn new(source: &Path, destination: &Path, allow: AllowList) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            allow,
            prune: false,
        }
    }

    /// Remove destination files that have no source counterpart after copying.
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Build from the `[sync]` section, using the configured environment's destination.
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::new(
            &config.sync.content,
            config.destination(),
            AllowList::new(&config.sync.extensions),
        )
        .with_prune(config.sync.prune)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn allow(&self) -> &AllowList {
        &self.allow
    }

    /// Run one pass and signal `session` to restart if a copy pass executed.
    pub fn run_attached(&self, session: Option<&dyn Session>) -> SyncReport {
        let report = self.run();
        if report.copy_executed()
            && let Some(session) = session
        {
            session.restart();
        }
        report
    }

    /// Run one pass.
    pub fn run(&self) -> SyncReport {
        let sources = collect_sources(&self.source, &self.allow, &self.destination);
        if sources.is_empty() {
            log!("sync"; "no source images found, skipping copy");
            return SyncReport::new(SyncDecision::NoSources, &self.destination);
        }

        let (mirror, collisions) = flatten(&sources);
        for collision in &collisions {
            log!("warn"; "{} source files named `{}`, using {}",
                 collision.sources.len(), collision.name, collision.winner.display());
        }

        let existing = collect_destination(&self.destination, &self.allow);
        log!("sync"; "found {} source files, {} destination files", mirror.len(), existing.len());

        let decision = decide(&mirror, &existing);
        let mut report = SyncReport::new(decision, &self.destination);
        report.sources = mirror.len();
        report.destinations = existing.len();
        report.collisions = collisions;

        if !report.decision.needs_copy() {
            log!("sync"; "all files up to date, skipping copy");
            return report;
        }

        log!("sync"; "{}, copying...", report.decision);
        self.copy_all(&mirror, &mut report);

        if self.prune {
            let keep: FxHashSet<&OsStr> = mirror.iter().map(|s| s.name.as_os_str()).collect();
            for orphan in existing.iter().filter(|d| !keep.contains(d.name.as_os_str())) {
                match fs::remove_file(&orphan.path) {
                    Ok(()) => {
                        log!("sync"; "pruned {}", orphan.display_name());
                        report.pruned.push(orphan.path.clone());
                    }
                    Err(e) => report.record(&SyncError::Remove(orphan.path.clone(), e)),
                }
            }
        }

        log!("sync"; "copied {} files", report.copied);
        report
    }

    /// Copy every mirrored source into the destination, overwriting.
    ///
    /// Each copy takes its source's modification time, so a source dated in
    /// the future does not look newer on every following pass.
    fn copy_all(&self, mirror: &[&SourceAsset], report: &mut SyncReport) {
        if let Err(e) = fs::create_dir_all(&self.destination) {
            report.record(&SyncError::CreateDir(self.destination.clone(), e));
            return;
        }

        for source in mirror {
            let target = self.destination.join(&source.name);
            match fs::copy(&source.path, &target) {
                Ok(_) => {
                    report.copied += 1;
                    if let Err(e) = stamp_mtime(&target, source.modified) {
                        log!("warn"; "cannot set modification time of {}: {e}", target.display());
                    }
                }
                Err(e) => report.record(&SyncError::Copy(source.path.clone(), target, e)),
            }
        }
    }
}

fn stamp_mtime(path: &Path, modified: SystemTime) -> io::Result<()> {
    fs::File::options().write(true).open(path)?.set_modified(modified)
}

/// Reduce sources to one entry per file name. The last source in enumeration
/// order wins; every name claimed more than once is reported as a collision.
fn flatten(sources: &[SourceAsset]) -> (Vec<&SourceAsset>, Vec<Collision>) {
    let mut mirror: Vec<&SourceAsset> = Vec::with_capacity(sources.len());
    let mut slots: FxHashMap<&OsStr, usize> = FxHashMap::default();
    let mut claims: FxHashMap<&OsStr, Vec<PathBuf>> = FxHashMap::default();

    for source in sources {
        let name = source.name.as_os_str();
        claims.entry(name).or_default().push(source.path.clone());
        match slots.get(name) {
            Some(&slot) => mirror[slot] = source,
            None => {
                slots.insert(name, mirror.len());
                mirror.push(source);
            }
        }
    }

    let collisions = mirror
        .iter()
        .filter_map(|winner| {
            let paths = claims.remove(winner.name.as_os_str())?;
            (paths.len() > 1).then(|| Collision {
                name: winner.display_name().into_owned(),
                sources: paths,
                winner: winner.path.clone(),
            })
        })
        .collect();

    (mirror, collisions)
}

/// Remove the destination file named like `deleted` (file-name match only).
///
/// Returns the removed paths: one entry, or none when there was nothing to remove.
pub fn remove_asset(destination: &Path, deleted: &Path) -> Vec<PathBuf> {
    let Some(name) = deleted.file_name() else {
        return Vec::new();
    };
    let target = destination.join(name);

    match fs::remove_file(&target) {
        Ok(()) => {
            log!("sync"; "deleted asset {}", target.display());
            vec![target]
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log!("sync"; "no corresponding asset for {}", deleted.display());
            Vec::new()
        }
        Err(e) => {
            log!("error"; "{}", SyncFailure::from(&SyncError::Remove(target, e)).error);
            Vec::new()
        }
    }
}
