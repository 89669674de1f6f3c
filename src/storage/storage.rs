use super::backend::{MemoryBackend, StorageBackend};
use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::{debug, trace};

/// A change to one key, delivered to every listener of a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub key: String,
    /// Raw stored text after the change; `None` when the entry was removed.
    pub new_value: Option<String>,
}

type Listener = Arc<dyn Fn(&Notification) -> Result<()> + Send + Sync>;

/// Listeners registered in one context, delivered in registration order.
struct ListenerRegistry {
    next_id: AtomicUsize,
    listeners: RwLock<BTreeMap<usize, Listener>>,
}

impl ListenerRegistry {
    fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            listeners: RwLock::new(BTreeMap::new()),
        }
    }

    fn insert(&self, listener: Listener) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        id
    }

    fn remove(&self, id: usize) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn snapshot(&self) -> Vec<Listener> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One execution context's view of the shared store.
///
/// A `Storage` pairs a backend with the listeners registered in this
/// context. Every write is followed by a synchronous [`Notification`] to
/// those listeners, including ones belonging to the writer itself. A context
/// built with [`Storage::unavailable`] has no store: reads return nothing and
/// writes and subscriptions do nothing.
///
/// Clones share the same backend and listeners.
///
/// # Examples
///
/// ```
/// use kvcell::storage::Storage;
/// use std::sync::{Arc, Mutex};
///
/// let storage = Storage::in_memory();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen_clone = seen.clone();
///
/// let _sub = storage.subscribe(move |n| {
///     seen_clone.lock().unwrap().push(n.key.clone());
///     Ok(())
/// });
///
/// storage.write("theme", "\"dark\"").unwrap();
/// assert_eq!(storage.read("theme").as_deref(), Some("\"dark\""));
/// assert_eq!(*seen.lock().unwrap(), vec!["theme".to_string()]);
/// ```
#[derive(Clone)]
pub struct Storage {
    backend: Option<Arc<dyn StorageBackend>>,
    listeners: Arc<ListenerRegistry>,
}

impl Storage {
    /// Create a context over `backend`.
    ///
    /// Pass clones of one `Arc` to several contexts to model independent
    /// contexts sharing one store.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend: Some(backend),
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    /// Create a context over a fresh, unbounded [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Create a headless context with no store.
    pub fn unavailable() -> Self {
        Self {
            backend: None,
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    /// Whether this context has a store.
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// The backend, if any.
    pub fn backend(&self) -> Option<&Arc<dyn StorageBackend>> {
        self.backend.as_ref()
    }

    /// Read the raw entry for `key`.
    pub fn read(&self, key: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        let raw = backend.get(key);
        trace!(key = %key, present = raw.is_some(), "storage read");
        raw
    }

    /// Every key with an entry, sorted. Empty when no store is available.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = self
            .backend
            .as_ref()
            .map(|backend| backend.keys())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    /// Persist `value` under `key`, then notify this context's listeners.
    ///
    /// Backend failures return before any listener runs. Listener failures
    /// are returned after every listener has seen the notification.
    pub fn write(&self, key: &str, value: &str) -> Result<()> {
        self.persist(key, value)?;
        self.broadcast(key, Some(value))
    }

    /// Persist without notifying. Only backend errors are returned.
    pub(crate) fn persist(&self, key: &str, value: &str) -> Result<()> {
        let Some(backend) = self.backend.as_ref() else {
            return Ok(());
        };
        backend.set(key, value)?;
        debug!(key = %key, value = %value, "storage write");
        Ok(())
    }

    /// Notify this context's listeners of a change made here.
    pub(crate) fn broadcast(&self, key: &str, new_value: Option<&str>) -> Result<()> {
        if self.backend.is_none() {
            return Ok(());
        }
        self.deliver(&Notification {
            key: key.to_string(),
            new_value: new_value.map(str::to_string),
        })
    }

    /// Delete the entry for `key`, then notify with an empty value.
    pub fn remove(&self, key: &str) -> Result<()> {
        let Some(backend) = self.backend.as_ref() else {
            return Ok(());
        };
        backend.remove(key);
        debug!(key = %key, "storage remove");
        self.deliver(&Notification {
            key: key.to_string(),
            new_value: None,
        })
    }

    /// Deliver a notification that originated in another context.
    ///
    /// The backend is not touched; the host is expected to have persisted the
    /// value already.
    pub fn notify(&self, key: &str, new_value: Option<&str>) -> Result<()> {
        self.broadcast(key, new_value)
    }

    /// Register a listener for every notification in this context.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Notification) -> Result<()> + Send + Sync + 'static,
    {
        if self.backend.is_none() {
            return Subscription::inert();
        }
        let id = self.listeners.insert(Arc::new(listener));
        trace!(listener = id, "listener registered");
        Subscription {
            id: Some(id),
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        // Listeners may subscribe or unsubscribe while being called.
        let listeners = self.listeners.snapshot();
        trace!(key = %notification.key, listeners = listeners.len(), "delivering notification");

        let mut first_error = None;
        for listener in listeners {
            if let Err(err) = listener(notification) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("available", &self.is_available())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// RAII guard for a notification listener.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    id: Option<usize>,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    fn inert() -> Self {
        Self {
            id: None,
            registry: Weak::new(),
        }
    }

    /// Whether a listener is actually registered.
    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.registry.strong_count() > 0
    }

    /// Unregister the listener now, rather than when the guard goes out of scope.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let (Some(id), Some(registry)) = (self.id.take(), self.registry.upgrade()) {
            registry.remove(id);
            trace!(listener = id, "listener removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    fn recorder(storage: &Storage) -> (Arc<Mutex<Vec<Notification>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sub = storage.subscribe(move |n| {
            seen_clone.lock().unwrap().push(n.clone());
            Ok(())
        });
        (seen, sub)
    }

    #[test]
    fn write_persists_then_notifies() {
        let storage = Storage::in_memory();
        let (seen, _sub) = recorder(&storage);

        storage.write("k", "1").unwrap();

        assert_eq!(storage.read("k").as_deref(), Some("1"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Notification {
                key: "k".into(),
                new_value: Some("1".into())
            }]
        );
    }

    #[test]
    fn listener_sees_value_already_stored() {
        let storage = Storage::in_memory();
        let reader = storage.clone();
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();
        let _sub = storage.subscribe(move |n| {
            *observed_clone.lock().unwrap() = reader.read(&n.key);
            Ok(())
        });

        storage.write("k", "\"v\"").unwrap();
        assert_eq!(observed.lock().unwrap().as_deref(), Some("\"v\""));
    }

    #[test]
    fn remove_notifies_with_none() {
        let storage = Storage::in_memory();
        storage.write("k", "1").unwrap();
        let (seen, _sub) = recorder(&storage);

        storage.remove("k").unwrap();

        assert_eq!(storage.read("k"), None);
        assert_eq!(seen.lock().unwrap()[0].new_value, None);
    }

    #[test]
    fn keys_lists_entries_in_order() {
        let storage = Storage::in_memory();
        storage.write("b", "2").unwrap();
        storage.write("a", "1").unwrap();
        storage.write("c", "3").unwrap();
        storage.remove("c").unwrap();

        assert_eq!(storage.keys(), vec!["a".to_string(), "b".to_string()]);
        assert!(Storage::unavailable().keys().is_empty());
    }

    #[test]
    fn notify_does_not_touch_backend() {
        let storage = Storage::in_memory();
        let (seen, _sub) = recorder(&storage);

        storage.notify("k", Some("5")).unwrap();

        assert_eq!(storage.read("k"), None);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let storage = Storage::in_memory();
        let (seen, sub) = recorder(&storage);
        assert_eq!(storage.listener_count(), 1);

        sub.unsubscribe();
        assert_eq!(storage.listener_count(), 0);

        storage.write("k", "1").unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn contexts_sharing_a_backend_have_separate_listeners() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let tab_a = Storage::new(backend.clone());
        let tab_b = Storage::new(backend);
        let (seen_b, _sub) = recorder(&tab_b);

        tab_a.write("k", "1").unwrap();

        assert_eq!(tab_b.read("k").as_deref(), Some("1"));
        assert!(seen_b.lock().unwrap().is_empty());
    }

    #[test]
    fn unavailable_storage_is_a_no_op() {
        let storage = Storage::unavailable();
        let sub = storage.subscribe(|_| panic!("never delivered"));

        assert!(!sub.is_active());
        storage.write("k", "1").unwrap();
        storage.notify("k", Some("1")).unwrap();
        storage.remove("k").unwrap();
        assert_eq!(storage.read("k"), None);
        assert_eq!(storage.listener_count(), 0);
    }

    #[test]
    fn write_failure_skips_notification() {
        let storage = Storage::new(Arc::new(MemoryBackend::with_quota(4)));
        let (seen, _sub) = recorder(&storage);

        let err = storage.write("key", "toolong").unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { .. }));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn listener_error_reaches_writer_after_full_delivery() {
        let storage = Storage::in_memory();
        let _failing = storage.subscribe(|n| Err(Error::Backend(format!("rejected {}", n.key))));
        let (seen, _sub) = recorder(&storage);

        let err = storage.write("k", "1").unwrap_err();
        assert!(matches!(err, Error::Backend(ref msg) if msg == "rejected k"));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(storage.read("k").as_deref(), Some("1"));
    }
}
