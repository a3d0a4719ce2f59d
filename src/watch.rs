//! Image watcher for development mode.
//!
//! Watches the content tree for image changes and keeps the destination in step:
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────────────────────────┐
//! │ notify   │──▶│ classify() │──▶│ ChangeHandler                    │
//! │ events   │   │ allow-list │   │                                  │
//! └──────────┘   └────────────┘   │  Added / Modified                │
//!                                 │    rebuild ──ok──▶ restart       │
//!                                 │            └─err─▶ log, skip     │
//!                                 │  Removed                         │
//!                                 │    remove dest/<name> ──▶ restart│
//!                                 └──────────────────────────────────┘
//! ```
//!
//! Events are not debounced. Each add/modify rebuild runs on its own thread,
//! so rebuilds triggered in quick succession may overlap.

use crate::{
    asset::{AllowList, AssetSync, remove_asset},
    config::ProjectConfig,
    exec, log,
    session::{Detached, Session},
    utils::exec::FilterRule,
};
use anyhow::{Context, Result};
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{CreateKind, MetadataKind, ModifyKind, RenameMode},
};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
    thread::{self, JoinHandle},
};

/// npm echoes the script line and deprecation notices on stderr.
const BUILD_NOISE: &[&str] = &["> ", "npm WARN", "npm warn"];

// =============================================================================
// Rebuild
// =============================================================================

/// Rebuilds served output after an image was added or modified.
pub trait Rebuild: Send + Sync {
    /// Returns `Ok(true)` when served output changed and the session should restart.
    fn rebuild(&self) -> Result<bool>;
}

/// Runs the project's `[watch] build` command, then a sync pass.
#[derive(Debug, Clone)]
pub struct ProjectRebuild {
    root: PathBuf,
    command: Vec<String>,
    sync: AssetSync,
    filter: FilterRule,
}

impl ProjectRebuild {
    pub fn new(root: &Path, command: Vec<String>, sync: AssetSync) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            command,
            sync,
            filter: FilterRule::new(BUILD_NOISE)?,
        })
    }

    pub fn from_config(config: &ProjectConfig) -> Result<Self> {
        Self::new(
            config.get_root(),
            config.watch.build.clone(),
            AssetSync::from_config(config),
        )
    }
}

impl Rebuild for ProjectRebuild {
    fn rebuild(&self) -> Result<bool> {
        let ran_command = !self.command.is_empty();
        if ran_command {
            log!("watch"; "running `{}`...", self.command.join(" "));
            exec!(filter=&self.filter; self.root.as_path(); &self.command;)?;
            log!("watch"; "build completed");
        }

        let report = self.sync.run();
        Ok(ran_command || report.changed())
    }
}

// =============================================================================
// Change Classification
// =============================================================================

/// An allow-listed image change under the watch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetChange {
    Added(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

impl AssetChange {
    pub fn path(&self) -> &Path {
        match self {
            Self::Added(path) | Self::Modified(path) | Self::Removed(path) => path,
        }
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Translate a notify event into image changes.
///
/// Renames become a removal of the old name and an addition of the new one.
/// Access events, folder creation and permission/ownership changes are ignored.
pub fn classify(event: &Event, allow: &AllowList) -> Vec<AssetChange> {
    let paths = &event.paths;
    let changes = match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => paths.iter().cloned().map(AssetChange::Added).collect(),
        EventKind::Remove(_) => paths.iter().cloned().map(AssetChange::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, paths.as_slice()) {
            (RenameMode::From, [from, ..]) => vec![AssetChange::Removed(from.clone())],
            (RenameMode::To, [to, ..]) => vec![AssetChange::Added(to.clone())],
            (RenameMode::Both, [from, to, ..]) => vec![
                AssetChange::Removed(from.clone()),
                AssetChange::Added(to.clone()),
            ],
            _ => paths
                .iter()
                .map(|path| match path.exists() {
                    true => AssetChange::Added(path.clone()),
                    false => AssetChange::Removed(path.clone()),
                })
                .collect(),
        },
        EventKind::Modify(
            ModifyKind::Data(_)
            | ModifyKind::Any
            | ModifyKind::Metadata(MetadataKind::WriteTime | MetadataKind::Any),
        ) => paths.iter().cloned().map(AssetChange::Modified).collect(),
        _ => Vec::new(),
    };

    changes
        .into_iter()
        .filter(|change| allow.matches(change.path()) && !is_temp_file(change.path()))
        .filter(|change| !matches!(change, AssetChange::Added(p) | AssetChange::Modified(p) if p.is_dir()))
        .collect()
}

// =============================================================================
// Change Handler
// =============================================================================

/// What handling one change did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    Rebuilt { restarted: bool },
    RebuildFailed,
    /// Destination files removed; empty when there was no counterpart.
    Removed(Vec<PathBuf>),
}

/// Reacts to image changes. Collaborators are injected at construction.
pub struct ChangeHandler {
    root: PathBuf,
    destination: PathBuf,
    rebuild: Arc<dyn Rebuild>,
    session: Arc<dyn Session>,
}

impl ChangeHandler {
    pub fn new(
        root: &Path,
        destination: &Path,
        rebuild: Arc<dyn Rebuild>,
        session: Arc<dyn Session>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            destination: destination.to_path_buf(),
            rebuild,
            session,
        }
    }

    pub fn from_config(config: &ProjectConfig, session: Arc<dyn Session>) -> Result<Self> {
        Ok(Self::new(
            config.get_root(),
            config.destination(),
            Arc::new(ProjectRebuild::from_config(config)?),
            session,
        ))
    }

    /// Whether `path` lies in the destination this handler writes to.
    ///
    /// Copies landing there must not be fed back as source changes.
    pub fn is_destination(&self, path: &Path) -> bool {
        path.starts_with(&self.destination)
    }

    pub fn handle(&self, change: &AssetChange) -> ChangeOutcome {
        match change {
            AssetChange::Added(path) => {
                log!("watch"; "new image detected: {}", self.rel(path));
                self.rebuild_and_restart()
            }
            AssetChange::Modified(path) => {
                log!("watch"; "image modified: {}", self.rel(path));
                self.rebuild_and_restart()
            }
            AssetChange::Removed(path) => {
                log!("watch"; "image deleted: {}", self.rel(path));
                let removed = remove_asset(&self.destination, path);
                if removed.is_empty() {
                    log!("watch"; "no cleanup needed, asset may not have been built yet");
                } else {
                    log!("watch"; "cleaned up {} asset file(s), restarting...", removed.len());
                    self.session.restart();
                }
                ChangeOutcome::Removed(removed)
            }
        }
    }

    fn rebuild_and_restart(&self) -> ChangeOutcome {
        match self.rebuild.rebuild() {
            Ok(true) => {
                log!("watch"; "assets updated, restarting...");
                self.session.restart();
                ChangeOutcome::Rebuilt { restarted: true }
            }
            Ok(false) => ChangeOutcome::Rebuilt { restarted: false },
            Err(e) => {
                log!("watch"; "build failed");
                log!("error"; "{e:#}");
                ChangeOutcome::RebuildFailed
            }
        }
    }

    /// `/proj/src/sections/intro/a.png` → `src/sections/intro/a.png`
    fn rel(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

// =============================================================================
// Watcher
// =============================================================================

/// A live subscription to image changes under a root.
///
/// Dropping the watcher releases the OS watch handles and stops the event
/// thread. Rebuilds already in flight run to completion.
pub struct AssetWatcher {
    watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
}

impl AssetWatcher {
    /// Subscribe to changes under `watch_root`. Pre-existing files are not reported.
    pub fn new(watch_root: &Path, allow: AllowList, handler: ChangeHandler) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
        watcher
            .watch(watch_root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", watch_root.display()))?;

        let handler = Arc::new(handler);
        let thread = thread::Builder::new()
            .name("asset-watcher".into())
            .spawn(move || event_loop(&rx, &allow, &handler))
            .context("Failed to spawn watcher thread")?;

        Ok(Self {
            watcher: Some(watcher),
            thread: Some(thread),
        })
    }
}

impl Drop for AssetWatcher {
    fn drop(&mut self) {
        // Dropping the notify watcher drops its sender, which ends the event loop
        drop(self.watcher.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Watch `watch_root` and route every image change to `handler`.
///
/// The subscription lives as long as the returned watcher.
pub fn watch_and_sync(
    watch_root: &Path,
    allow: AllowList,
    handler: ChangeHandler,
) -> Result<AssetWatcher> {
    AssetWatcher::new(watch_root, allow, handler)
}

fn event_loop(
    rx: &mpsc::Receiver<notify::Result<Event>>,
    allow: &AllowList,
    handler: &Arc<ChangeHandler>,
) {
    for result in rx {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                log!("watch"; "error: {e}");
                continue;
            }
        };

        let changes = classify(&event, allow)
            .into_iter()
            .filter(|change| !handler.is_destination(change.path()));

        for change in changes {
            match change {
                AssetChange::Removed(_) => {
                    handler.handle(&change);
                }
                _ => {
                    let handler = Arc::clone(handler);
                    let spawned = thread::Builder::new()
                        .name("asset-rebuild".into())
                        .spawn(move || {
                            handler.handle(&change);
                        });
                    if let Err(e) = spawned {
                        log!("watch"; "failed to start rebuild: {e}");
                    }
                }
            }
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Sync once, then watch the content tree until Ctrl+C. No server is attached.
pub fn watch_site(config: &ProjectConfig) -> Result<()> {
    let sync = AssetSync::from_config(config);
    sync.run();

    let handler = ChangeHandler::from_config(config, Arc::new(Detached))?;
    let _watcher = watch_and_sync(&config.sync.content, sync.allow().clone(), handler)?;
    log!("watch"; "watching {} → {}", config.sync.content.display(), config.destination().display());

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to set Ctrl+C handler")?;

    let _ = rx.recv();
    log!("watch"; "shutting down...");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::RemoveKind;
    use parking_lot::Mutex;
    use std::{
        fs,
        io::Write,
        sync::atomic::{AtomicUsize, Ordering},
        time::{Duration, Instant},
    };
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSession(AtomicUsize);

    impl Session for RecordingSession {
        fn restart(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl RecordingSession {
        fn restarts(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Returns a fixed result and counts calls.
    struct FakeRebuild {
        result: Mutex<Option<Result<bool>>>,
        calls: AtomicUsize,
    }

    impl FakeRebuild {
        fn returning(result: Result<bool>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Rebuild for FakeRebuild {
        fn rebuild(&self) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.lock().take().unwrap_or(Ok(true))
        }
    }

    /// Delegates to a real rebuild and counts calls.
    struct CountingRebuild {
        inner: ProjectRebuild,
        calls: AtomicUsize,
    }

    impl Rebuild for CountingRebuild {
        fn rebuild(&self) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.rebuild()
        }
    }

    fn handler(
        dest: &Path,
        rebuild: Arc<dyn Rebuild>,
        session: Arc<RecordingSession>,
    ) -> ChangeHandler {
        ChangeHandler::new(Path::new("/proj"), dest, rebuild, session)
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    // ------------------------------------------------------------------------
    // classify
    // ------------------------------------------------------------------------

    #[test]
    fn test_classify_create_and_remove() {
        let allow = AllowList::images();
        let created = event(EventKind::Create(CreateKind::File), &["/c/a.png", "/c/a.md"]);
        assert_eq!(
            classify(&created, &allow),
            vec![AssetChange::Added("/c/a.png".into())]
        );

        let removed = event(EventKind::Remove(RemoveKind::File), &["/c/diagram.PNG"]);
        assert_eq!(
            classify(&removed, &allow),
            vec![AssetChange::Removed("/c/diagram.PNG".into())]
        );
    }

    #[test]
    fn test_classify_modify() {
        let allow = AllowList::images();
        let data = event(
            EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
            &["/c/a.svg"],
        );
        assert_eq!(
            classify(&data, &allow),
            vec![AssetChange::Modified("/c/a.svg".into())]
        );

        let perms = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/c/a.svg"],
        );
        assert!(classify(&perms, &allow).is_empty());
    }

    #[test]
    fn test_classify_rename_both() {
        let allow = AllowList::images();
        let rename = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/c/old.png", "/c/new.png"],
        );
        assert_eq!(
            classify(&rename, &allow),
            vec![
                AssetChange::Removed("/c/old.png".into()),
                AssetChange::Added("/c/new.png".into()),
            ]
        );

        // Renaming away from an image extension only removes
        let retyped = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/c/old.png", "/c/old.txt"],
        );
        assert_eq!(
            classify(&retyped, &allow),
            vec![AssetChange::Removed("/c/old.png".into())]
        );
    }

    #[test]
    fn test_classify_rename_halves() {
        let allow = AllowList::images();
        let from = event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/c/a.gif"]);
        let to = event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/c/b.gif"]);
        assert_eq!(classify(&from, &allow), vec![AssetChange::Removed("/c/a.gif".into())]);
        assert_eq!(classify(&to, &allow), vec![AssetChange::Added("/c/b.gif".into())]);
    }

    #[test]
    fn test_classify_ignores_noise() {
        let allow = AllowList::images();
        let access = event(
            EventKind::Access(notify::event::AccessKind::Read),
            &["/c/a.png"],
        );
        assert!(classify(&access, &allow).is_empty());

        let folder = event(EventKind::Create(CreateKind::Folder), &["/c/images.png"]);
        assert!(classify(&folder, &allow).is_empty());

        let temp = event(EventKind::Create(CreateKind::File), &["/c/.a.png", "/c/a.png~"]);
        assert!(classify(&temp, &allow).is_empty());
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("a.png.swp")));
        assert!(is_temp_file(Path::new(".hidden.png")));
        assert!(is_temp_file(Path::new("a.png~")));
        assert!(!is_temp_file(Path::new("a.png")));
    }

    // ------------------------------------------------------------------------
    // ChangeHandler
    // ------------------------------------------------------------------------

    #[test]
    fn test_added_rebuilds_then_restarts() {
        let dest = TempDir::new().unwrap();
        let rebuild = FakeRebuild::returning(Ok(true));
        let session = Arc::new(RecordingSession::default());
        let handler = handler(dest.path(), rebuild.clone(), session.clone());

        let outcome = handler.handle(&AssetChange::Added("/proj/src/a.png".into()));

        assert_eq!(outcome, ChangeOutcome::Rebuilt { restarted: true });
        assert_eq!(rebuild.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.restarts(), 1);
    }

    #[test]
    fn test_rebuild_failure_skips_restart() {
        let dest = TempDir::new().unwrap();
        let rebuild = FakeRebuild::returning(Err(anyhow::anyhow!("Command `npm` failed")));
        let session = Arc::new(RecordingSession::default());
        let handler = handler(dest.path(), rebuild, session.clone());

        let outcome = handler.handle(&AssetChange::Modified("/proj/src/a.png".into()));

        assert_eq!(outcome, ChangeOutcome::RebuildFailed);
        assert_eq!(session.restarts(), 0);
    }

    #[test]
    fn test_rebuild_without_changes_does_not_restart() {
        let dest = TempDir::new().unwrap();
        let rebuild = FakeRebuild::returning(Ok(false));
        let session = Arc::new(RecordingSession::default());
        let handler = handler(dest.path(), rebuild, session.clone());

        let outcome = handler.handle(&AssetChange::Modified("/proj/src/a.png".into()));

        assert_eq!(outcome, ChangeOutcome::Rebuilt { restarted: false });
        assert_eq!(session.restarts(), 0);
    }

    #[test]
    fn test_removed_deletes_counterpart_and_restarts() {
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("diagram.png"), b"d").unwrap();
        let rebuild = FakeRebuild::returning(Ok(true));
        let session = Arc::new(RecordingSession::default());
        let handler = handler(dest.path(), rebuild.clone(), session.clone());

        let outcome = handler.handle(&AssetChange::Removed("/proj/src/ch1/diagram.png".into()));

        assert_eq!(
            outcome,
            ChangeOutcome::Removed(vec![dest.path().join("diagram.png")])
        );
        assert!(!dest.path().join("diagram.png").exists());
        assert_eq!(session.restarts(), 1);
        assert_eq!(rebuild.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_removed_without_counterpart_is_noop() {
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("other.png"), b"o").unwrap();
        let session = Arc::new(RecordingSession::default());
        let handler = handler(dest.path(), FakeRebuild::returning(Ok(true)), session.clone());

        let outcome = handler.handle(&AssetChange::Removed("/proj/src/diagram.png".into()));

        assert_eq!(outcome, ChangeOutcome::Removed(Vec::new()));
        assert!(dest.path().join("other.png").exists());
        assert_eq!(session.restarts(), 0);
    }

    #[test]
    fn test_is_destination() {
        let session = Arc::new(RecordingSession::default());
        let handler = handler(Path::new("/proj/src/assets"), FakeRebuild::returning(Ok(true)), session);

        assert!(handler.is_destination(Path::new("/proj/src/assets/a.png")));
        assert!(!handler.is_destination(Path::new("/proj/src/a.png")));
        assert!(!handler.is_destination(Path::new("/proj/src/assets-old/a.png")));
    }

    #[test]
    fn test_rel_path_display() {
        let handler = handler(
            Path::new("/tmp"),
            FakeRebuild::returning(Ok(true)),
            Arc::new(RecordingSession::default()),
        );
        assert_eq!(handler.rel(Path::new("/proj/src/a.png")), "src/a.png");
        assert_eq!(handler.rel(Path::new("/elsewhere/a.png")), "/elsewhere/a.png");
    }

    // ------------------------------------------------------------------------
    // ProjectRebuild
    // ------------------------------------------------------------------------

    #[test]
    fn test_project_rebuild_without_command_runs_sync() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let dest = dir.path().join("assets");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.png"), b"a").unwrap();

        let sync = AssetSync::new(&source, &dest, AllowList::images());
        let rebuild = ProjectRebuild::new(dir.path(), Vec::new(), sync).unwrap();

        assert!(rebuild.rebuild().unwrap());
        assert!(dest.join("a.png").exists());
        // Nothing left to copy
        assert!(!rebuild.rebuild().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_project_rebuild_command_failure() {
        let dir = TempDir::new().unwrap();
        let sync = AssetSync::new(&dir.path().join("src"), &dir.path().join("assets"), AllowList::images());
        let command = vec!["sh".into(), "-c".into(), "echo boom >&2; exit 1".into()];
        let rebuild = ProjectRebuild::new(dir.path(), command, sync).unwrap();

        let err = rebuild.rebuild().unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn test_project_rebuild_command_runs_in_root() {
        let dir = TempDir::new().unwrap();
        let sync = AssetSync::new(&dir.path().join("src"), &dir.path().join("assets"), AllowList::images());
        let command = vec!["sh".into(), "-c".into(), "touch built".into()];
        let rebuild = ProjectRebuild::new(dir.path(), command, sync).unwrap();

        assert!(rebuild.rebuild().unwrap());
        assert!(dir.path().join("built").exists());
    }

    // ------------------------------------------------------------------------
    // AssetWatcher
    // ------------------------------------------------------------------------

    fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(25));
        }
        cond()
    }

    #[test]
    fn test_watcher_add_and_delete() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let dest = dir.path().join("assets");
        fs::create_dir_all(source.join("chapter")).unwrap();
        fs::create_dir_all(&dest).unwrap();

        let sync = AssetSync::new(&source, &dest, AllowList::images());
        let rebuild = Arc::new(ProjectRebuild::new(dir.path(), Vec::new(), sync).unwrap());
        let session = Arc::new(RecordingSession::default());
        let handler = ChangeHandler::new(dir.path(), &dest, rebuild, session.clone());
        let watcher = AssetWatcher::new(&source, AllowList::images(), handler).unwrap();

        let image = source.join("chapter/new.png");
        fs::write(&image, b"fresh").unwrap();
        fs::write(source.join("chapter/notes.md"), b"# notes").unwrap();
        assert!(wait_until(Duration::from_secs(10), || dest.join("new.png").exists()));
        assert!(wait_until(Duration::from_secs(10), || session.restarts() >= 1));
        assert!(!dest.join("notes.md").exists());

        fs::remove_file(&image).unwrap();
        assert!(wait_until(Duration::from_secs(10), || !dest.join("new.png").exists()));

        drop(watcher);
    }

    #[test]
    fn test_watcher_modify_existing_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let dest = dir.path().join("assets");
        fs::create_dir_all(source.join("chapter")).unwrap();
        let image = source.join("chapter/diagram.png");
        fs::write(&image, b"v1").unwrap();

        let sync = AssetSync::new(&source, &dest, AllowList::images());
        sync.run();
        assert_eq!(fs::read(dest.join("diagram.png")).unwrap(), b"v1");

        let rebuild = Arc::new(CountingRebuild {
            inner: ProjectRebuild::new(dir.path(), Vec::new(), sync).unwrap(),
            calls: AtomicUsize::new(0),
        });
        let session = Arc::new(RecordingSession::default());
        let handler = ChangeHandler::new(dir.path(), &dest, rebuild.clone(), session.clone());
        let watcher = AssetWatcher::new(&source, AllowList::images(), handler).unwrap();

        // Starting the watcher on an existing tree triggers nothing
        thread::sleep(Duration::from_millis(300));
        assert_eq!(rebuild.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.restarts(), 0);

        let mut file = fs::OpenOptions::new().write(true).open(&image).unwrap();
        file.write_all(b"v2").unwrap();
        file.sync_all().unwrap();
        drop(file);

        assert!(wait_until(Duration::from_secs(10), || {
            fs::read(dest.join("diagram.png")).is_ok_and(|bytes| bytes == b"v2")
        }));
        assert!(wait_until(Duration::from_secs(10), || session.restarts() >= 1));
        assert!(rebuild.calls.load(Ordering::SeqCst) >= 1);

        drop(watcher);
    }

    #[test]
    fn test_watcher_ignores_destination_inside_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let dest = source.join("assets");
        fs::create_dir_all(&source).unwrap();

        let sync = AssetSync::new(&source, &dest, AllowList::images());
        let rebuild = Arc::new(CountingRebuild {
            inner: ProjectRebuild::new(dir.path(), Vec::new(), sync).unwrap(),
            calls: AtomicUsize::new(0),
        });
        let session = Arc::new(RecordingSession::default());
        let handler = ChangeHandler::new(dir.path(), &dest, rebuild.clone(), session.clone());
        let watcher = AssetWatcher::new(&source, AllowList::images(), handler).unwrap();

        fs::write(source.join("a.png"), b"a").unwrap();
        assert!(wait_until(Duration::from_secs(10), || dest.join("a.png").exists()));
        assert!(wait_until(Duration::from_secs(10), || session.restarts() >= 1));

        // Copies into the destination must not feed back as new changes
        thread::sleep(Duration::from_millis(500));
        let settled = rebuild.calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(500));
        assert_eq!(rebuild.calls.load(Ordering::SeqCst), settled);
        assert!(dest.join("a.png").exists());

        drop(watcher);
    }

    #[test]
    fn test_watcher_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let handler = handler(
            dir.path(),
            FakeRebuild::returning(Ok(true)),
            Arc::new(RecordingSession::default()),
        );
        assert!(AssetWatcher::new(&dir.path().join("missing"), AllowList::images(), handler).is_err());
    }
}
