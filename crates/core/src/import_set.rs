use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use importwatch_project::ImportReader;

use crate::events::{EventSource, PipelineError};
use crate::solution_observer::{SolutionEvent, SolutionSnapshot};

/// Sorted, distinct import paths of one solution.
/// 單一方案已排序且不重複的匯入路徑集合。
///
/// Two sets are equal when their path sequences are equal; the solution path
/// is carried along for reporting only.
#[derive(Debug, Clone, Default)]
pub struct ImportSet {
    pub solution_path: Option<PathBuf>,
    pub paths: Vec<PathBuf>,
}

impl PartialEq for ImportSet {
    fn eq(&self, other: &Self) -> bool {
        self.paths == other.paths
    }
}

impl Eq for ImportSet {}

impl ImportSet {
    /// The set published when a solution closes.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Sorts byte-wise and drops duplicates.
    pub fn from_unsorted(solution_path: Option<PathBuf>, mut paths: Vec<PathBuf>) -> Self {
        paths.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        paths.dedup();
        Self {
            solution_path,
            paths,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Default)]
struct DiffState {
    previous: ImportSet,
    emitted_since_close: bool,
}

/// Second stage: computes the import set and publishes it only when it changes.
/// 第二階段：計算匯入集合，僅在內容改變時發布。
pub struct ImportSetComputer {
    reader: Arc<dyn ImportReader>,
    state: Mutex<DiffState>,
    changes: EventSource<ImportSet>,
}

impl ImportSetComputer {
    pub fn new(reader: Arc<dyn ImportReader>) -> Self {
        Self {
            reader,
            state: Mutex::new(DiffState::default()),
            changes: EventSource::new(),
        }
    }

    pub fn changes(&self) -> &EventSource<ImportSet> {
        &self.changes
    }

    /// Last set handed downstream (empty after a close).
    pub fn previous(&self) -> ImportSet {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .previous
            .clone()
    }

    pub fn on_solution_event(&self, event: &SolutionEvent) -> Result<(), PipelineError> {
        match event {
            SolutionEvent::Changed(snapshot) => self.on_snapshot(snapshot),
            SolutionEvent::Closing => self.on_closing(),
        }
    }

    fn on_snapshot(&self, snapshot: &SolutionSnapshot) -> Result<(), PipelineError> {
        // The reader's project cache must not outlive one recomputation.
        self.reader.unload_all();
        if snapshot.solution_path.is_none() {
            return Ok(());
        }

        let next = ImportSet::from_unsorted(
            snapshot.solution_path.clone(),
            self.collect_imports(snapshot),
        );
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.previous == next {
                log::debug!("import set unchanged ({} file(s))", next.len());
                return Ok(());
            }
            state.previous = next.clone();
            state.emitted_since_close = true;
        }
        log::debug!("import set changed to {} file(s)", next.len());
        self.changes.emit(&next)
    }

    fn collect_imports(&self, snapshot: &SolutionSnapshot) -> Vec<PathBuf> {
        let mut imports = Vec::new();
        for project in &snapshot.project_paths {
            if project.as_os_str().is_empty() {
                continue;
            }
            match self.reader.import_paths(project) {
                Ok(paths) => imports.extend(paths),
                Err(err) => log::warn!("skipping imports of {}: {err}", project.display()),
            }
        }
        imports
    }

    fn on_closing(&self) -> Result<(), PipelineError> {
        self.reader.unload_all();
        let should_emit = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let should_emit = state.emitted_since_close || !state.previous.is_empty();
            *state = DiffState::default();
            should_emit
        };
        if should_emit {
            log::debug!("solution closing, clearing import set");
            self.changes.emit(&ImportSet::closed())
        } else {
            Ok(())
        }
    }
}
