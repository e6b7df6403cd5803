use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::events::{EventSource, PipelineError};
use crate::host::{ChangeMask, FileChange, FileChangeService, FileChangeSink, WatchCookie};
use crate::import_set::ImportSet;

/// Raised once per change callback from the watch service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTouched {
    pub solution_path: PathBuf,
}

/// One live watch held by the coordinator.
/// 協調器持有的一筆有效監看註冊。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    pub path: PathBuf,
    pub cookie: WatchCookie,
}

/// Sink handed to the watch service; forwards callbacks as [`FileTouched`].
struct TouchRelay {
    solution_path: Mutex<Option<PathBuf>>,
    touched: EventSource<FileTouched>,
}

impl FileChangeSink for TouchRelay {
    fn files_changed(&self, changes: &[FileChange]) {
        let solution_path = self
            .solution_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(solution_path) = solution_path else {
            return;
        };
        log::debug!(
            "{} watched import(s) touched: {:?}",
            changes.len(),
            changes.iter().map(|change| &change.path).collect::<Vec<_>>()
        );
        if let Err(err) = self.touched.emit(&FileTouched { solution_path }) {
            log::error!("file touched handler failed: {err}");
        }
    }
}

/// Third stage: keeps exactly one watch per path of the latest import set.
/// 第三階段：讓有效監看恰好對應最新匯入集合中的每個路徑。
pub struct WatchCoordinator {
    service: Arc<dyn FileChangeService>,
    registrations: Mutex<Vec<WatchRegistration>>,
    relay: Arc<TouchRelay>,
}

impl WatchCoordinator {
    pub fn new(service: Arc<dyn FileChangeService>) -> Self {
        Self {
            service,
            registrations: Mutex::new(Vec::new()),
            relay: Arc::new(TouchRelay {
                solution_path: Mutex::new(None),
                touched: EventSource::new(),
            }),
        }
    }

    pub fn touched(&self) -> &EventSource<FileTouched> {
        &self.relay.touched
    }

    /// Drops every watch, then watches each path of `set`.
    /// 先移除所有監看，再為 `set` 中每個路徑建立監看。
    ///
    /// Any advise or unadvise failure aborts the cycle.
    pub fn on_import_set_changed(&self, set: &ImportSet) -> Result<(), PipelineError> {
        let mut registrations = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.release(&mut registrations)?;

        *self
            .relay
            .solution_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = set.solution_path.clone();
        if set.solution_path.is_none() {
            return Ok(());
        }

        let sink: Arc<dyn FileChangeSink> = self.relay.clone();
        for path in &set.paths {
            let cookie = self
                .service
                .advise(path, ChangeMask::TIME, Arc::clone(&sink))
                .map_err(|source| PipelineError::Advise {
                    path: path.clone(),
                    source,
                })?;
            registrations.push(WatchRegistration {
                path: path.clone(),
                cookie,
            });
        }
        log::debug!("watching {} import(s)", registrations.len());
        Ok(())
    }

    /// Fail-fast release used inside a change cycle; failed and later
    /// registrations stay recorded.
    fn release(&self, registrations: &mut Vec<WatchRegistration>) -> Result<(), PipelineError> {
        let mut released = 0;
        let mut result = Ok(());
        for registration in registrations.iter() {
            if let Err(err) = self.unadvise(registration) {
                result = Err(err);
                break;
            }
            released += 1;
        }
        registrations.drain(..released);
        result
    }

    fn unadvise(&self, registration: &WatchRegistration) -> Result<(), PipelineError> {
        self.service
            .unadvise(registration.cookie)
            .map_err(|source| PipelineError::Unadvise {
                path: registration.path.clone(),
                cookie: registration.cookie,
                source,
            })
    }

    /// Unregisters everything; called when the pipeline stops.
    /// 停止管線時解除全部監看。
    ///
    /// Every cookie is attempted even after a failure, and the collection is
    /// empty afterwards. The first failure is returned.
    pub fn dispose(&self) -> Result<(), PipelineError> {
        let mut registrations = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *self
            .relay
            .solution_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        let mut first_error = None;
        for registration in registrations.drain(..) {
            if let Err(err) = self.unadvise(&registration) {
                log::warn!("{err}");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn registrations(&self) -> Vec<WatchRegistration> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn registered_paths(&self) -> Vec<PathBuf> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|registration| registration.path.clone())
            .collect()
    }

    pub fn registration_count(&self) -> usize {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
