use crate::cell::{CellValue, Reducer};
use crate::codec::{decode, encode};
use crate::error::Result;
use crate::storage::Storage;
use std::sync::Arc;
use tracing::debug;

/// A reducer-driven writer that holds no state of its own.
///
/// Each dispatch reads the key from the store, applies the reducer, writes
/// the result, and notifies listeners. Nothing is cached between calls and
/// the key is never seeded; an empty key reaches the reducer as `None`.
///
/// # Examples
///
/// ```
/// use kvcell::storage::Storage;
/// use kvcell::Dispatcher;
///
/// let storage = Storage::in_memory();
/// let bump = Dispatcher::new(&storage, "visits", |n: Option<&u32>, by: u32| n.copied().unwrap_or(0) + by);
///
/// bump.dispatch(2).unwrap();
/// bump.dispatch(3).unwrap();
/// assert_eq!(storage.read("visits").as_deref(), Some("5"));
/// ```
pub struct Dispatcher<T, A> {
    storage: Storage,
    key: String,
    reducer: Reducer<T, A>,
}

impl<T: CellValue, A> Dispatcher<T, A> {
    pub fn new<F>(storage: &Storage, key: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(Option<&T>, A) -> T + Send + Sync + 'static,
    {
        Self {
            storage: storage.clone(),
            key: key.into(),
            reducer: Arc::new(reducer),
        }
    }

    /// Apply `action` to the stored state and write the result.
    pub fn dispatch(&self, action: A) -> Result<()> {
        if !self.storage.is_available() {
            return Ok(());
        }
        let raw = self.storage.read(&self.key);
        let current: Option<T> = decode(&self.key, raw.as_deref())?;
        let next = (self.reducer)(current.as_ref(), action);
        let encoded = encode(Some(&next))?;
        debug!(key = %self.key, "detached dispatch");
        self.storage.write(&self.key, &encoded)
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<T, A> Clone for Dispatcher<T, A> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            key: self.key.clone(),
            reducer: Arc::clone(&self.reducer),
        }
    }
}

/// Create a [`Dispatcher`] bound to the current context.
pub fn create_dispatcher<T, A, F>(key: impl Into<String>, reducer: F) -> Dispatcher<T, A>
where
    T: CellValue,
    F: Fn(Option<&T>, A) -> T + Send + Sync + 'static,
{
    Dispatcher::new(&Storage::current(), key, reducer)
}
