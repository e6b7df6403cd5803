//! Wires the pipeline stages together and follows the on/off toggle.
//! 串接各管線階段，並依開關啟動或停止。

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use importwatch_project::ImportsNode;
use importwatch_settings::{FeatureToggle, ListenerId};

use crate::events::{PipelineError, SubscriptionId};
use crate::host::HostServices;
use crate::import_set::{ImportSet, ImportSetComputer};
use crate::reload::ReloadSignaler;
use crate::solution_observer::{FaultHandler, SolutionEvent, SolutionObserver};
use crate::tree_projector::TreeProjector;
use crate::watch::{FileTouched, WatchCoordinator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureStatus {
    Stopped,
    Running,
    /// Stopped by a watch failure; the message is the error text.
    Faulted(String),
}

/// One running instance of the five stages and the subscriptions between them.
struct Pipeline {
    observer: Arc<SolutionObserver>,
    computer: Arc<ImportSetComputer>,
    coordinator: Arc<WatchCoordinator>,
    projector: Arc<TreeProjector>,
    snapshot_link: SubscriptionId,
    watch_link: SubscriptionId,
    tree_link: SubscriptionId,
    reload_link: SubscriptionId,
}

impl Pipeline {
    fn wire(services: &HostServices, on_fault: FaultHandler) -> Self {
        let observer = Arc::new(SolutionObserver::new(
            Arc::clone(&services.solution),
            on_fault,
        ));
        let computer = Arc::new(ImportSetComputer::new(Arc::clone(&services.import_reader)));
        let coordinator = Arc::new(WatchCoordinator::new(Arc::clone(&services.file_changes)));
        let projector = Arc::new(TreeProjector::new(
            Arc::clone(&services.tree_registry),
            Arc::clone(&services.opener),
        ));
        let signaler = ReloadSignaler::new();

        let snapshot_link = {
            let computer = Arc::clone(&computer);
            observer
                .events()
                .subscribe(move |event: &SolutionEvent| computer.on_solution_event(event))
        };
        let watch_link = {
            let coordinator = Arc::clone(&coordinator);
            computer
                .changes()
                .subscribe(move |set: &ImportSet| coordinator.on_import_set_changed(set))
        };
        let tree_link = {
            let projector = Arc::clone(&projector);
            computer
                .changes()
                .subscribe(move |set: &ImportSet| projector.on_import_set_changed(set))
        };
        let reload_link = coordinator.touched().subscribe(move |event: &FileTouched| {
            if let Err(err) = signaler.on_file_touched(event) {
                log::warn!("{err}");
            }
            Ok(())
        });

        Self {
            observer,
            computer,
            coordinator,
            projector,
            snapshot_link,
            watch_link,
            tree_link,
            reload_link,
        }
    }

    /// Unwinds in reverse wiring order.
    fn teardown(self) {
        self.coordinator.touched().unsubscribe(self.reload_link);
        if let Err(err) = self.coordinator.dispose() {
            log::error!("failed to release import watches: {err}");
        }
        self.projector.detach();
        self.observer.stop();
        self.computer.changes().unsubscribe(self.tree_link);
        self.computer.changes().unsubscribe(self.watch_link);
        self.observer.events().unsubscribe(self.snapshot_link);
    }
}

struct FeatureInner {
    services: HostServices,
    pipeline: Mutex<Option<Pipeline>>,
    status: Mutex<FeatureStatus>,
}

impl FeatureInner {
    fn set_status(&self, status: FeatureStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn start(self: &Arc<Self>) {
        let observer = {
            let mut slot = self.pipeline.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return;
            }
            let weak: Weak<Self> = Arc::downgrade(self);
            let on_fault: FaultHandler = Arc::new(move |err: &PipelineError| {
                if let Some(inner) = weak.upgrade() {
                    inner.fault(err);
                }
            });
            let pipeline = Pipeline::wire(&self.services, on_fault);
            let observer = Arc::clone(&pipeline.observer);
            *slot = Some(pipeline);
            observer
        };
        self.set_status(FeatureStatus::Running);
        log::info!("import watcher started");

        if let Err(err) = observer.start() {
            self.fault(&err);
        }
    }

    fn take_pipeline(&self) -> Option<Pipeline> {
        self.pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn stop(&self) {
        if let Some(pipeline) = self.take_pipeline() {
            pipeline.teardown();
            self.set_status(FeatureStatus::Stopped);
            log::info!("import watcher stopped");
        }
    }

    fn fault(&self, err: &PipelineError) {
        log::error!("import watcher stopped after a watch failure: {err}");
        if let Some(pipeline) = self.take_pipeline() {
            pipeline.teardown();
        }
        self.set_status(FeatureStatus::Faulted(err.to_string()));
        self.services.notifier.feature_faulted(err);
    }

    fn with_pipeline<R>(&self, f: impl FnOnce(&Pipeline) -> R) -> Option<R> {
        self.pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }
}

/// The imports watcher as a whole: runs the pipeline while the toggle is on.
/// 匯入監看功能本體：開關開啟期間執行整條管線。
///
/// Turning the toggle off disposes every stage, releases every watch and
/// removes the virtual node. A watch failure stops the pipeline, leaves the
/// status at [`FeatureStatus::Faulted`] and reports through
/// [`crate::host::FeatureNotifier`]; switching the toggle off and on again
/// restarts it.
pub struct ImportWatcherFeature {
    inner: Arc<FeatureInner>,
    toggle: Arc<FeatureToggle>,
    listener: ListenerId,
}

impl fmt::Debug for ImportWatcherFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportWatcherFeature")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ImportWatcherFeature {
    pub fn new(services: HostServices, toggle: Arc<FeatureToggle>) -> Self {
        let inner = Arc::new(FeatureInner {
            services,
            pipeline: Mutex::new(None),
            status: Mutex::new(FeatureStatus::Stopped),
        });
        let weak = Arc::downgrade(&inner);
        let listener = toggle.subscribe(move |enabled| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if enabled {
                inner.start();
            } else {
                inner.stop();
            }
        });
        Self {
            inner,
            toggle,
            listener,
        }
    }

    /// Starts the pipeline if the toggle is already on.
    /// 若開關已開啟則立即啟動管線。
    pub fn initialize(&self) {
        if self.toggle.get() {
            self.inner.start();
        }
    }

    /// Stops the pipeline regardless of the toggle, e.g. on host shutdown.
    pub fn shutdown(&self) {
        self.inner.stop();
    }

    pub fn status(&self) -> FeatureStatus {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.status() == FeatureStatus::Running
    }

    pub fn tree_node(&self) -> Option<Arc<ImportsNode>> {
        self.inner
            .with_pipeline(|pipeline| pipeline.projector.node())
            .flatten()
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.inner
            .with_pipeline(|pipeline| pipeline.coordinator.registered_paths())
            .unwrap_or_default()
    }

    /// The set the pipeline last acted on.
    pub fn current_imports(&self) -> ImportSet {
        self.inner
            .with_pipeline(|pipeline| pipeline.computer.previous())
            .unwrap_or_default()
    }
}

impl Drop for ImportWatcherFeature {
    fn drop(&mut self) {
        self.toggle.unsubscribe(self.listener);
        self.inner.stop();
    }
}
