use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::events::{EventSource, PipelineError};
use crate::host::{HostCookie, HostError, SolutionHost, SolutionSignal};

/// Called when a cascade started by a host signal fails.
pub type FaultHandler = Arc<dyn Fn(&PipelineError) + Send + Sync>;

/// Wholesale picture of the open solution.
/// 目前開啟方案的完整快照。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolutionSnapshot {
    pub solution_path: Option<PathBuf>,
    pub project_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolutionEvent {
    Changed(SolutionSnapshot),
    Closing,
}

/// First pipeline stage: turns host lifecycle signals into snapshots.
/// 管線第一階段：將宿主生命週期訊號轉為方案快照。
pub struct SolutionObserver {
    host: Arc<dyn SolutionHost>,
    cookies: Mutex<Vec<(SolutionSignal, HostCookie)>>,
    events: EventSource<SolutionEvent>,
    on_fault: FaultHandler,
}

impl SolutionObserver {
    pub fn new(host: Arc<dyn SolutionHost>, on_fault: FaultHandler) -> Self {
        Self {
            host,
            cookies: Mutex::new(Vec::new()),
            events: EventSource::new(),
            on_fault,
        }
    }

    pub fn events(&self) -> &EventSource<SolutionEvent> {
        &self.events
    }

    /// Subscribes to the four host signals, then publishes the current state so
    /// a solution that is already open gets picked up.
    /// 訂閱四個宿主訊號後立即發布目前狀態，以涵蓋啟動前已開啟的方案。
    pub fn start(self: &Arc<Self>) -> Result<(), PipelineError> {
        {
            let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
            if cookies.is_empty() {
                for signal in SolutionSignal::ALL {
                    let weak: Weak<Self> = Arc::downgrade(self);
                    let cookie = self.host.advise(
                        signal,
                        Arc::new(move || {
                            if let Some(observer) = weak.upgrade() {
                                observer.handle_signal(signal);
                            }
                        }),
                    );
                    cookies.push((signal, cookie));
                }
            }
        }
        self.refresh()
    }

    /// Unsubscribes every host signal. Safe to call more than once.
    pub fn stop(&self) {
        let cookies = std::mem::take(
            &mut *self.cookies.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (signal, cookie) in cookies {
            self.host.unadvise(signal, cookie);
        }
    }

    pub fn is_started(&self) -> bool {
        !self
            .cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn handle_signal(&self, signal: SolutionSignal) {
        log::debug!("solution signal {signal:?}");
        let result = match signal {
            SolutionSignal::BeforeClosing => self.events.emit(&SolutionEvent::Closing),
            SolutionSignal::Opened | SolutionSignal::ProjectAdded | SolutionSignal::ProjectRemoved => {
                self.refresh()
            }
        };
        if let Err(err) = result {
            (self.on_fault)(&err);
        }
    }

    /// Re-reads the host and publishes a fresh snapshot.
    pub fn refresh(&self) -> Result<(), PipelineError> {
        let snapshot = self.snapshot();
        self.events.emit(&SolutionEvent::Changed(snapshot))
    }

    /// Projects that cannot report a path are left out.
    /// 無法回報路徑的專案會被略過。
    pub fn snapshot(&self) -> SolutionSnapshot {
        let solution_path = self.host.solution_path();
        let mut project_paths = Vec::new();
        for entry in self.host.project_file_names() {
            match entry {
                Ok(name) if name.trim().is_empty() => {}
                Ok(name) => project_paths.push(PathBuf::from(name)),
                Err(HostError::NotImplemented) => {
                    log::debug!("skipping project that cannot report its file name");
                }
                Err(err) => log::warn!("skipping project: {err}"),
            }
        }
        SolutionSnapshot {
            solution_path,
            project_paths,
        }
    }
}

impl Drop for SolutionObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SignalHandler;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StubHost {
        handlers: Mutex<HashMap<u64, (SolutionSignal, SignalHandler)>>,
        next: Mutex<u64>,
        projects: Vec<Result<String, HostError>>,
    }

    impl StubHost {
        fn fire(&self, signal: SolutionSignal) {
            let handlers: Vec<SignalHandler> = self
                .handlers
                .lock()
                .unwrap()
                .values()
                .filter(|(s, _)| *s == signal)
                .map(|(_, h)| h.clone())
                .collect();
            for handler in handlers {
                handler();
            }
        }
    }

    impl SolutionHost for StubHost {
        fn solution_path(&self) -> Option<PathBuf> {
            Some(PathBuf::from("/work/app.sln"))
        }

        fn project_file_names(&self) -> Vec<Result<String, HostError>> {
            self.projects.clone()
        }

        fn advise(&self, signal: SolutionSignal, handler: SignalHandler) -> HostCookie {
            let mut next = self.next.lock().unwrap();
            *next += 1;
            self.handlers.lock().unwrap().insert(*next, (signal, handler));
            HostCookie(*next)
        }

        fn unadvise(&self, _signal: SolutionSignal, cookie: HostCookie) {
            self.handlers.lock().unwrap().remove(&cookie.0);
        }
    }

    fn no_fault() -> FaultHandler {
        Arc::new(|err: &PipelineError| panic!("unexpected fault: {err}"))
    }

    #[test]
    fn snapshot_skips_unavailable_projects() {
        let host = Arc::new(StubHost {
            projects: vec![
                Ok("/work/a.csproj".into()),
                Err(HostError::NotImplemented),
                Ok("  ".into()),
                Err(HostError::Other("boom".into())),
                Ok("/work/b.vcxproj".into()),
            ],
            ..StubHost::default()
        });
        let observer = SolutionObserver::new(host, no_fault());

        let snapshot = observer.snapshot();
        assert_eq!(snapshot.solution_path, Some(PathBuf::from("/work/app.sln")));
        assert_eq!(
            snapshot.project_paths,
            vec![PathBuf::from("/work/a.csproj"), PathBuf::from("/work/b.vcxproj")]
        );
    }

    #[test]
    fn start_publishes_immediately_and_stop_unsubscribes() {
        let host = Arc::new(StubHost::default());
        let observer = Arc::new(SolutionObserver::new(host.clone(), no_fault()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        observer.events().subscribe(move |event: &SolutionEvent| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });

        observer.start().unwrap();
        assert_eq!(host.handlers.lock().unwrap().len(), 4);
        assert!(matches!(seen.lock().unwrap()[0], SolutionEvent::Changed(_)));

        host.fire(SolutionSignal::ProjectAdded);
        host.fire(SolutionSignal::BeforeClosing);
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(seen.lock().unwrap()[2], SolutionEvent::Closing);

        observer.stop();
        observer.stop();
        assert!(host.handlers.lock().unwrap().is_empty());
        assert!(!observer.is_started());
    }

    #[test]
    fn failing_subscriber_reaches_fault_handler() {
        let host = Arc::new(StubHost::default());
        let faults = Arc::new(Mutex::new(0));
        let counter = faults.clone();
        let observer = Arc::new(SolutionObserver::new(
            host.clone(),
            Arc::new(move |_: &PipelineError| *counter.lock().unwrap() += 1),
        ));
        observer.start().unwrap();
        observer.events().subscribe(|_| {
            Err(PipelineError::Advise {
                path: PathBuf::from("/x.props"),
                source: crate::file_monitor::FileMonitorError::Rejected("denied".into()),
            })
        });

        host.fire(SolutionSignal::Opened);
        assert_eq!(*faults.lock().unwrap(), 1);
    }
}
