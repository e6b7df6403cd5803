use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Identifier returned by [`FeatureToggle::subscribe`].
/// 訂閱開關變更時取得的識別碼。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Observable on/off switch for an optional feature.
/// 可觀察的功能開關，值改變時通知訂閱者。
///
/// Listeners run on the thread calling [`FeatureToggle::set`], after the new
/// value is visible, and only when the value actually changes.
pub struct FeatureToggle {
    value: Mutex<bool>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for FeatureToggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureToggle")
            .field("value", &self.get())
            .finish_non_exhaustive()
    }
}

impl FeatureToggle {
    pub fn new(initial: bool) -> Self {
        Self {
            value: Mutex::new(initial),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn get(&self) -> bool {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value`; returns `true` and notifies listeners if it changed.
    /// 設定新值；若有變更則通知訂閱者並回傳 `true`。
    pub fn set(&self, value: bool) -> bool {
        {
            let mut current = self.value.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == value {
                return false;
            }
            *current = value;
        }
        log::debug!("feature toggle changed to {value}");

        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(value);
        }
        true
    }

    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_fire_only_on_change() {
        let toggle = FeatureToggle::new(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        toggle.subscribe(move |value| sink.lock().unwrap().push(value));

        assert!(!toggle.set(false));
        assert!(toggle.set(true));
        assert!(!toggle.set(true));
        assert!(toggle.set(false));

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn unsubscribed_listener_is_not_called() {
        let toggle = FeatureToggle::new(false);
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        let id = toggle.subscribe(move |_| *sink.lock().unwrap() += 1);

        assert!(toggle.unsubscribe(id));
        assert!(!toggle.unsubscribe(id));
        toggle.set(true);
        assert_eq!(*seen.lock().unwrap(), 0);
        assert!(toggle.get());
    }
}
