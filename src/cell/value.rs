use super::options::CellOptions;
use super::watch::{WatchGuard, Watchers};
use crate::codec::{decode, encode};
use crate::error::Result;
use crate::storage::{Notification, Storage, Subscription};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Values a cell can persist.
pub trait CellValue: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {}

impl<T> CellValue for T where T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {}

/// State shared between a cell and its notification listener.
struct CellState<T> {
    key: String,
    value: RwLock<Option<T>>,
    initial_state: Option<T>,
    watchers: Arc<Watchers<Option<T>>>,
}

impl<T: CellValue> CellState<T> {
    fn get(&self) -> Option<T> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store `next` and tell watchers if it differs from the cached value.
    fn replace(&self, next: Option<T>) {
        {
            let mut value = self.value.write().unwrap_or_else(PoisonError::into_inner);
            if *value == next {
                return;
            }
            *value = next.clone();
        }
        debug!(key = %self.key, "cell value changed");
        self.watchers.notify(&next);
    }

    fn on_notification(&self, notification: &Notification) -> Result<()> {
        if notification.key != self.key {
            return Ok(());
        }
        let decoded: Option<T> = decode(&self.key, notification.new_value.as_deref())?;
        let differs = *self.value.read().unwrap_or_else(PoisonError::into_inner) != decoded;
        if differs {
            self.replace(decoded.or_else(|| self.initial_state.clone()));
        }
        Ok(())
    }
}

/// The last-known value of one store key, as seen by one observer.
///
/// A cell reads the store once when created. Writes go through the store and
/// notify every listener in the context, this cell included. With
/// `sync` enabled (the default) the cell follows notifications for its key;
/// without it the cell only changes through its own writes.
///
/// Creating a cell for a key with no entry seeds the store with the encoded
/// `initial_state`. If an entry already exists, `initial_state` is ignored.
///
/// # Examples
///
/// ```
/// use kvcell::storage::Storage;
/// use kvcell::{CellOptions, ValueCell};
///
/// let storage = Storage::in_memory();
/// let a = ValueCell::new(&storage, "volume", CellOptions::new().initial_state(3)).unwrap();
/// let b: ValueCell<i32> = ValueCell::new(&storage, "volume", CellOptions::new()).unwrap();
///
/// a.update(|v| v.copied().unwrap_or(0) + 1).unwrap();
/// assert_eq!(a.get(), Some(4));
/// assert_eq!(b.get(), Some(4));
/// assert_eq!(storage.read("volume").as_deref(), Some("4"));
/// ```
pub struct ValueCell<T> {
    state: Arc<CellState<T>>,
    storage: Storage,
    subscription: Option<Subscription>,
}

impl<T: CellValue> ValueCell<T> {
    /// Create a cell for `key` in `storage`.
    ///
    /// Fails if the stored entry cannot be decoded, or if seeding the store
    /// fails.
    pub fn new(storage: &Storage, key: impl Into<String>, options: CellOptions<T>) -> Result<Self> {
        let key = key.into();
        let CellOptions {
            initial_state,
            sync,
        } = options;

        let raw = storage.read(&key);
        let stored: Option<T> = decode(&key, raw.as_deref())?;

        let state = Arc::new(CellState {
            value: RwLock::new(stored.or_else(|| initial_state.clone())),
            key,
            initial_state,
            watchers: Watchers::new(),
        });

        let subscription = sync.then(|| {
            let state = Arc::clone(&state);
            storage.subscribe(move |notification| state.on_notification(notification))
        });

        let cell = Self {
            state,
            storage: storage.clone(),
            subscription,
        };

        if raw.is_none() && storage.is_available() {
            let seed = encode(cell.state.initial_state.as_ref())?;
            debug!(key = %cell.state.key, seed = %seed, "seeding empty key");
            storage.write(&cell.state.key, &seed)?;
        }

        Ok(cell)
    }

    /// Get a clone of the cached value.
    pub fn get(&self) -> Option<T> {
        self.state.get()
    }

    /// Read the cached value with a function.
    ///
    /// `f` runs on a snapshot, so it may write to this cell.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let value = self.get();
        f(value.as_ref())
    }

    /// Write `value` through the store.
    pub fn set(&self, value: T) -> Result<()> {
        self.store(Some(value))
    }

    /// Write the result of applying `f` to the cached value.
    ///
    /// `f` sees this cell's cached value, not a fresh store read.
    pub fn update(&self, f: impl FnOnce(Option<&T>) -> T) -> Result<()> {
        let current = self.get();
        self.store(Some(f(current.as_ref())))
    }

    /// Write the absent value through the store.
    pub fn unset(&self) -> Result<()> {
        self.store(None)
    }

    fn store(&self, next: Option<T>) -> Result<()> {
        if !self.storage.is_available() {
            return Ok(());
        }
        let encoded = encode(next.as_ref())?;
        self.storage.persist(&self.state.key, &encoded)?;
        // Once persisted the write stands, even if a listener rejects it.
        let delivered = self.storage.broadcast(&self.state.key, Some(encoded.as_str()));
        self.state.replace(next);
        delivered
    }

    /// Watch the cached value.
    ///
    /// `callback` runs immediately with the current value and again after
    /// every change, until the guard is dropped.
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(&Option<T>) + Send + Sync + 'static,
    {
        self.state.watchers.watch(&self.get(), callback)
    }

    pub fn key(&self) -> &str {
        &self.state.key
    }

    /// Whether this cell follows notifications.
    pub fn is_synced(&self) -> bool {
        self.subscription.is_some()
    }
}

/// Create a [`ValueCell`] in the current context.
///
/// See [`Storage::current`].
pub fn create_value_cell<T: CellValue>(
    key: impl Into<String>,
    options: CellOptions<T>,
) -> Result<ValueCell<T>> {
    ValueCell::new(&Storage::current(), key, options)
}
