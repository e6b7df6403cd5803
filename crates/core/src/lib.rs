//! Reactive pipeline that watches the files a solution's projects import and
//! nudges the host to reload the solution when any of them changes.
//! 監看方案中各專案匯入的外部檔案，於變更時促使宿主重新載入方案的事件管線。
//!
//! Data flows strictly downstream:
//! `SolutionObserver → ImportSetComputer → { WatchCoordinator, TreeProjector }`
//! and `WatchCoordinator → ReloadSignaler`. [`ImportWatcherFeature`] is the
//! only place that wires and unwires those stages.

pub mod events;
pub mod feature;
pub mod file_monitor;
pub mod host;
pub mod import_set;
pub mod reload;
pub mod solution_observer;
pub mod tree_projector;
pub mod watch;

pub use events::{EventSource, PipelineError, SubscriptionId};
pub use feature::{FeatureStatus, ImportWatcherFeature};
pub use file_monitor::{FileEvent, FileMonitor, FileMonitorError, FileMonitorEventKind};
pub use host::{
    ChangeMask, FeatureNotifier, FileChange, FileChangeService, FileChangeSink, HostCookie,
    HostError, HostServices, ProjectTreeRegistry, SignalHandler, SolutionHost, SolutionSignal,
    VirtualNodeFlags, WatchCookie,
};
pub use import_set::{ImportSet, ImportSetComputer};
pub use reload::{ReloadError, ReloadSignaler};
pub use solution_observer::{FaultHandler, SolutionEvent, SolutionObserver, SolutionSnapshot};
pub use tree_projector::TreeProjector;
pub use watch::{FileTouched, WatchCoordinator, WatchRegistration};
