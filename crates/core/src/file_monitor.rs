use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;

use crate::host::{ChangeMask, FileChange, FileChangeService, FileChangeSink, WatchCookie};

/// 監控檔案變更時可能回傳的錯誤。 / Error type for file monitoring operations.
#[derive(Debug, Error)]
pub enum FileMonitorError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("unknown watch cookie {0:?}")]
    UnknownCookie(WatchCookie),
    #[error("watch rejected: {0}")]
    Rejected(String),
}

/// 監控到的事件種類。 / Classifies observed file system changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMonitorEventKind {
    Modified,
    Removed,
    Created,
    Renamed { from: PathBuf, to: PathBuf },
    Other,
}

impl FileMonitorEventKind {
    fn change_mask(&self) -> ChangeMask {
        match self {
            FileMonitorEventKind::Modified => ChangeMask::TIME | ChangeMask::SIZE,
            FileMonitorEventKind::Removed => ChangeMask::DELETE,
            // A file that appears at a watched path has new contents.
            FileMonitorEventKind::Created | FileMonitorEventKind::Renamed { .. } => {
                ChangeMask::ADD | ChangeMask::TIME | ChangeMask::SIZE
            }
            FileMonitorEventKind::Other => ChangeMask::ATTRIBUTES,
        }
    }
}

/// 檔案事件的詳細資料。 / File event payload with resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileMonitorEventKind,
}

struct Registration {
    cookie: WatchCookie,
    mask: ChangeMask,
    sink: Arc<dyn FileChangeSink>,
}

#[derive(Default)]
struct Registry {
    by_path: HashMap<PathBuf, Vec<Registration>>,
    paths: HashMap<WatchCookie, PathBuf>,
    /// Watched directory -> number of distinct registered files in it.
    dirs: HashMap<PathBuf, usize>,
}

/// 以 `notify` 實作的逐檔監看服務。 / Per-file watch service backed by `notify`.
///
/// Files are watched through their parent directory, so a save that
/// replaces the file (write to a temporary file, then rename over it) keeps
/// being observed. Each directory is watched non-recursively once, however
/// many files and cookies refer to it, and only events for registered files
/// reach the sinks. Sinks are called on the watcher's background thread.
pub struct FileMonitor {
    // Held across watch/unwatch calls; the notify callback never takes it.
    watcher: Mutex<RecommendedWatcher>,
    registry: Arc<Mutex<Registry>>,
    next_cookie: AtomicU64,
}

impl FileMonitor {
    /// 建立新的監視器實例。 / Creates a new monitor instance.
    pub fn new() -> Result<Self, FileMonitorError> {
        let registry: Arc<Mutex<Registry>> = Arc::default();
        let dispatch_registry = Arc::clone(&registry);
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for mapped in map_event(event) {
                        dispatch(&dispatch_registry, mapped);
                    }
                }
                Err(err) => log::warn!("file watcher error: {err}"),
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            registry,
            next_cookie: AtomicU64::new(1),
        })
    }

    /// 目前受監看的檔案數量。 / Number of distinct files currently watched.
    pub fn watched_path_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_path
            .len()
    }

    /// 目前受監看的目錄數量。 / Number of directories holding an OS watch.
    pub fn watched_dir_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dirs
            .len()
    }
}

fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

impl FileChangeService for FileMonitor {
    fn advise(
        &self,
        path: &Path,
        mask: ChangeMask,
        sink: Arc<dyn FileChangeSink>,
    ) -> Result<WatchCookie, FileMonitorError> {
        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if !path.is_file() {
            return Err(notify::Error::path_not_found()
                .add_path(path.to_path_buf())
                .into());
        }
        let dir = parent_dir(path).ok_or_else(|| {
            FileMonitorError::Rejected(format!("{} has no parent directory", path.display()))
        })?;

        let (file_known, dir_known) = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            (
                registry.by_path.contains_key(path),
                registry.dirs.contains_key(&dir),
            )
        };
        if !dir_known {
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            log::debug!("watching directory {}", dir.display());
        }

        let cookie = WatchCookie(self.next_cookie.fetch_add(1, Ordering::Relaxed));
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if !file_known {
            *registry.dirs.entry(dir).or_insert(0) += 1;
        }
        registry
            .by_path
            .entry(path.to_path_buf())
            .or_default()
            .push(Registration { cookie, mask, sink });
        registry.paths.insert(cookie, path.to_path_buf());
        log::debug!("watching {} as {cookie:?}", path.display());
        Ok(cookie)
    }

    fn unadvise(&self, cookie: WatchCookie) -> Result<(), FileMonitorError> {
        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        let released_dir = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            let path = registry
                .paths
                .remove(&cookie)
                .ok_or(FileMonitorError::UnknownCookie(cookie))?;
            let now_empty = match registry.by_path.get_mut(&path) {
                Some(registrations) => {
                    registrations.retain(|registration| registration.cookie != cookie);
                    registrations.is_empty()
                }
                None => true,
            };
            if now_empty {
                registry.by_path.remove(&path);
                release_dir(&mut registry.dirs, &path)
            } else {
                None
            }
        };

        if let Some(dir) = released_dir {
            match watcher.unwatch(&dir) {
                Ok(()) => {}
                // The OS drops watches on deleted directories by itself.
                Err(err) if matches!(err.kind, notify::ErrorKind::WatchNotFound) => {
                    log::debug!("watch on {} already gone", dir.display());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

/// Drops one file from its directory's count; returns the directory once
/// no registered file is left in it.
fn release_dir(dirs: &mut HashMap<PathBuf, usize>, path: &Path) -> Option<PathBuf> {
    let dir = parent_dir(path)?;
    let count = dirs.get_mut(&dir)?;
    *count = count.saturating_sub(1);
    if *count > 0 {
        return None;
    }
    dirs.remove(&dir);
    Some(dir)
}

fn dispatch(registry: &Mutex<Registry>, event: FileEvent) {
    let kind = event.kind.change_mask();
    let sinks: Vec<Arc<dyn FileChangeSink>> = registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .by_path
        .get(&event.path)
        .map(|registrations| {
            registrations
                .iter()
                .filter(|registration| registration.mask.intersects(kind))
                .map(|registration| Arc::clone(&registration.sink))
                .collect()
        })
        .unwrap_or_default();

    if sinks.is_empty() {
        return;
    }
    let changes = [FileChange {
        path: event.path,
        kind,
    }];
    for sink in sinks {
        sink.files_changed(&changes);
    }
}

/// Splits one `notify` event into per-path events.
fn map_event(event: notify::Event) -> Vec<FileEvent> {
    let each = |paths: Vec<PathBuf>, kind: FileMonitorEventKind| {
        paths
            .into_iter()
            .map(|path| FileEvent {
                path,
                kind: kind.clone(),
            })
            .collect::<Vec<_>>()
    };

    let paths = event.paths;
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            let from = paths[0].clone();
            let to = paths[1].clone();
            vec![
                FileEvent {
                    path: from.clone(),
                    kind: FileMonitorEventKind::Removed,
                },
                FileEvent {
                    path: to.clone(),
                    kind: FileMonitorEventKind::Renamed { from, to },
                },
            ]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            each(paths, FileMonitorEventKind::Removed)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            each(paths, FileMonitorEventKind::Created)
        }
        // Backends that cannot tell the two ends apart.
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|path| {
                let kind = if path.exists() {
                    FileMonitorEventKind::Created
                } else {
                    FileMonitorEventKind::Removed
                };
                FileEvent { path, kind }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Metadata(_))
        | EventKind::Modify(ModifyKind::Any) => each(paths, FileMonitorEventKind::Modified),
        EventKind::Create(_) => each(paths, FileMonitorEventKind::Created),
        EventKind::Remove(_) => each(paths, FileMonitorEventKind::Removed),
        _ => each(paths, FileMonitorEventKind::Other),
    }
}
