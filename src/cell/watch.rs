use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

type Watcher<V> = Arc<dyn Fn(&V) + Send + Sync>;

/// Observer callbacks attached to one cell or selector.
pub(crate) struct Watchers<V> {
    next_id: AtomicUsize,
    watchers: RwLock<BTreeMap<usize, Watcher<V>>>,
}

impl<V: 'static> Watchers<V> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicUsize::new(0),
            watchers: RwLock::new(BTreeMap::new()),
        })
    }

    /// Register `callback` and call it once with `current`.
    pub(crate) fn watch<F>(self: &Arc<Self>, current: &V, callback: F) -> WatchGuard
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let callback: Watcher<V> = Arc::new(callback);
        self.watchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&callback));

        callback(current);

        let watchers: Arc<dyn Unwatch> = self.clone();
        WatchGuard {
            id,
            watchers: Arc::downgrade(&watchers),
        }
    }

    /// Call every watcher with `value`.
    pub(crate) fn notify(&self, value: &V) {
        // Callbacks may add or drop watchers.
        let watchers: Vec<Watcher<V>> = self
            .watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for watcher in watchers {
            watcher(value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

trait Unwatch: Send + Sync {
    fn unwatch(&self, id: usize);
}

impl<V: 'static> Unwatch for Watchers<V> {
    fn unwatch(&self, id: usize) {
        self.watchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// RAII guard for an observer callback.
///
/// The callback stays registered until the guard is dropped.
#[must_use = "dropping a WatchGuard unregisters its callback"]
pub struct WatchGuard {
    id: usize,
    watchers: Weak<dyn Unwatch>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(watchers) = self.watchers.upgrade() {
            watchers.unwatch(self.id);
        }
    }
}
