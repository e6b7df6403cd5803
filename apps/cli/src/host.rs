//! Stand-alone host: a `.sln` on disk stands in for the IDE's solution object.
//! 獨立宿主：以磁碟上的 `.sln` 代替 IDE 的方案物件。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};

use importwatch_core::{
    FeatureNotifier, FileChange, FileChangeSink, HostCookie, HostError, PipelineError,
    ProjectTreeRegistry, SignalHandler, SolutionHost, SolutionSignal, VirtualNodeFlags,
};
use importwatch_project::{
    DocumentOpener, ImportsNode, OpenDocumentError, SolutionFile, SolutionFileError, WindowHandle,
};

#[derive(Default)]
pub struct FileSolutionHost {
    solution: Mutex<Option<SolutionFile>>,
    handlers: Mutex<Vec<(HostCookie, SolutionSignal, SignalHandler)>>,
    next_cookie: AtomicU64,
}

impl FileSolutionHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, path: &Path) -> Result<(), SolutionFileError> {
        let solution = SolutionFile::load(path)?;
        log::info!(
            "opened {} with {} project(s)",
            solution.path().display(),
            solution.projects().len()
        );
        *self.solution.lock().unwrap_or_else(PoisonError::into_inner) = Some(solution);
        self.fire(SolutionSignal::Opened);
        Ok(())
    }

    /// Re-reads the open solution, as an IDE does after the user accepts a reload.
    pub fn reload(&self) -> Result<(), SolutionFileError> {
        let Some(path) = self.solution_path() else {
            return Ok(());
        };
        let solution = SolutionFile::load(&path)?;
        *self.solution.lock().unwrap_or_else(PoisonError::into_inner) = Some(solution);
        self.fire(SolutionSignal::ProjectAdded);
        Ok(())
    }

    pub fn close(&self) {
        if self.solution_path().is_none() {
            return;
        }
        self.fire(SolutionSignal::BeforeClosing);
        *self.solution.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn fire(&self, signal: SolutionSignal) {
        let handlers: Vec<SignalHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, registered, _)| *registered == signal)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler();
        }
    }
}

impl SolutionHost for FileSolutionHost {
    fn solution_path(&self) -> Option<PathBuf> {
        self.solution
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|solution| solution.path().to_path_buf())
    }

    fn project_file_names(&self) -> Vec<Result<String, HostError>> {
        self.solution
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|solution| {
                solution
                    .projects()
                    .iter()
                    .map(|project| Ok(project.path.to_string_lossy().into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn advise(&self, signal: SolutionSignal, handler: SignalHandler) -> HostCookie {
        let cookie = HostCookie(self.next_cookie.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((cookie, signal, handler));
        cookie
    }

    fn unadvise(&self, _signal: SolutionSignal, cookie: HostCookie) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _, _)| *existing != cookie);
    }
}

/// Prints node attach/detach instead of drawing a tree.
#[derive(Debug, Default)]
pub struct ConsoleTreeRegistry;

impl ProjectTreeRegistry for ConsoleTreeRegistry {
    fn add_virtual_node(&self, node: Arc<ImportsNode>, flags: VirtualNodeFlags) {
        log::debug!("attaching imports node with {flags:?}");
        println!("[tree] attached imports node ({} item(s))", node.item_count());
    }

    fn remove_virtual_node(&self, _node: &Arc<ImportsNode>) {
        println!("[tree] detached imports node");
    }
}

#[derive(Debug, Default)]
pub struct ConsoleOpener;

impl DocumentOpener for ConsoleOpener {
    fn open_standard_editor(
        &self,
        path: &Path,
        caption: &str,
    ) -> Result<WindowHandle, OpenDocumentError> {
        println!("[open] {caption}: {}", path.display());
        Ok(WindowHandle(0))
    }
}

#[derive(Debug, Default)]
pub struct StderrNotifier;

impl FeatureNotifier for StderrNotifier {
    fn feature_faulted(&self, error: &PipelineError) {
        eprintln!("Imports watcher stopped: {error}");
    }
}

/// Hands solution file changes to the main thread, which reloads it.
pub struct ReloadRequests(pub Mutex<Sender<PathBuf>>);

impl FileChangeSink for ReloadRequests {
    fn files_changed(&self, changes: &[FileChange]) {
        let sender = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        for change in changes {
            let _ = sender.send(change.path.clone());
        }
    }
}
