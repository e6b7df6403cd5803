use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::file_monitor::FileMonitorError;
use crate::host::WatchCookie;

/// Unrecoverable pipeline failure: the watch set can no longer be trusted.
/// 無法復原的管線錯誤：監看集合已不可信。
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to watch {path}: {source}")]
    Advise {
        path: PathBuf,
        #[source]
        source: FileMonitorError,
    },
    #[error("failed to stop watching {path} ({cookie:?}): {source}")]
    Unadvise {
        path: PathBuf,
        cookie: WatchCookie,
        #[source]
        source: FileMonitorError,
    },
}

/// Identifier returned by [`EventSource::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<T> = Arc<dyn Fn(&T) -> Result<(), PipelineError> + Send + Sync>;

/// Typed fan-out point between two pipeline stages.
/// 管線階段之間的型別化事件分派點。
///
/// Handlers run synchronously on the emitting thread in subscription order.
/// The handler list is copied before dispatch so handlers may subscribe or
/// unsubscribe while an emission is in flight.
pub struct EventSource<T> {
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for EventSource<T> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> fmt::Debug for EventSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> EventSource<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        handler: impl Fn(&T) -> Result<(), PipelineError> + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every handler, stopping at the first failure.
    /// 將事件送往所有處理器，遇到第一個錯誤即停止並回傳。
    pub fn emit(&self, event: &T) -> Result<(), PipelineError> {
        let handlers: Vec<Handler<T>> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event)?;
        }
        Ok(())
    }
}
