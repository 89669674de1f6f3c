use crate::cell::{CellValue, WatchGuard, Watchers};
use crate::codec::decode;
use crate::error::Result;
use crate::storage::{Notification, Storage, Subscription};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

type EqualityFn<U> = Arc<dyn Fn(&U, &U) -> bool + Send + Sync>;
type SelectFn<T, U> = Arc<dyn Fn(Option<&T>) -> U + Send + Sync>;

/// Per-selector configuration.
pub struct SelectorOptions<U> {
    /// Decides whether a new projection counts as unchanged. Defaults to `==`.
    pub equality_fn: Option<EqualityFn<U>>,
}

impl<U> SelectorOptions<U> {
    pub fn new() -> Self {
        Self { equality_fn: None }
    }

    pub fn equality_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&U, &U) -> bool + Send + Sync + 'static,
    {
        self.equality_fn = Some(Arc::new(f));
        self
    }
}

impl<U> Default for SelectorOptions<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> fmt::Debug for SelectorOptions<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorOptions")
            .field("custom_equality", &self.equality_fn.is_some())
            .finish()
    }
}

struct SelectorState<T, U> {
    key: String,
    select: SelectFn<T, U>,
    equality_fn: EqualityFn<U>,
    projection: RwLock<U>,
    watchers: Arc<Watchers<U>>,
}

impl<T, U> SelectorState<T, U>
where
    T: CellValue,
    U: Clone + Send + Sync + 'static,
{
    fn on_notification(&self, notification: &Notification) -> Result<()> {
        if notification.key != self.key {
            return Ok(());
        }
        let decoded: Option<T> = decode(&self.key, notification.new_value.as_deref())?;
        let next = (self.select)(decoded.as_ref());

        {
            let mut projection = self
                .projection
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if (self.equality_fn)(&*projection, &next) {
                trace!(key = %self.key, "projection unchanged");
                return Ok(());
            }
            *projection = next.clone();
        }

        debug!(key = %self.key, "projection changed");
        self.watchers.notify(&next);
        Ok(())
    }
}

/// A projection of one key's value that only changes when the projection does.
///
/// The projection is computed once on creation, then recomputed on every
/// notification for the key. Watchers hear about it only when the equality
/// function says the new projection differs from the last one.
///
/// # Examples
///
/// ```
/// use kvcell::storage::Storage;
/// use kvcell::{Selector, SelectorOptions};
/// use serde_json::{json, Value};
///
/// let storage = Storage::in_memory();
/// storage.write("prefs", r#"{"theme":"dark","zoom":1}"#).unwrap();
///
/// let theme = Selector::new(
///     &storage,
///     "prefs",
///     |prefs: Option<&Value>| prefs.map(|p| p["theme"].clone()),
///     SelectorOptions::new(),
/// )
/// .unwrap();
/// assert_eq!(theme.get(), Some(json!("dark")));
/// ```
pub struct Selector<T, U> {
    state: Arc<SelectorState<T, U>>,
    _subscription: Subscription,
}

impl<T, U> Selector<T, U>
where
    T: CellValue,
    U: Clone + Send + Sync + 'static,
{
    /// Create a selector comparing projections with `options.equality_fn`,
    /// or `==` when none is given.
    pub fn new<F>(
        storage: &Storage,
        key: impl Into<String>,
        select: F,
        options: SelectorOptions<U>,
    ) -> Result<Self>
    where
        F: Fn(Option<&T>) -> U + Send + Sync + 'static,
        U: PartialEq,
    {
        let equality_fn: EqualityFn<U> = match options.equality_fn {
            Some(f) => f,
            None => Arc::new(|prev: &U, next: &U| prev == next),
        };
        Self::build(storage, key.into(), Arc::new(select), equality_fn)
    }

    /// Create a selector for a projection type without `PartialEq`.
    pub fn with_equality<F, E>(
        storage: &Storage,
        key: impl Into<String>,
        select: F,
        equality_fn: E,
    ) -> Result<Self>
    where
        F: Fn(Option<&T>) -> U + Send + Sync + 'static,
        E: Fn(&U, &U) -> bool + Send + Sync + 'static,
    {
        Self::build(storage, key.into(), Arc::new(select), Arc::new(equality_fn))
    }

    fn build(
        storage: &Storage,
        key: String,
        select: SelectFn<T, U>,
        equality_fn: EqualityFn<U>,
    ) -> Result<Self> {
        let raw = storage.read(&key);
        let decoded: Option<T> = decode(&key, raw.as_deref())?;
        let projection = select(decoded.as_ref());

        let state = Arc::new(SelectorState {
            key,
            select,
            equality_fn,
            projection: RwLock::new(projection),
            watchers: Watchers::new(),
        });

        let subscription = {
            let state = Arc::clone(&state);
            storage.subscribe(move |notification| state.on_notification(notification))
        };

        Ok(Self {
            state,
            _subscription: subscription,
        })
    }

    /// Get a clone of the last propagated projection.
    pub fn get(&self) -> U {
        self.state
            .projection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Read the projection with a function.
    ///
    /// `f` runs on a snapshot, so it may write to the selected key.
    pub fn with<R>(&self, f: impl FnOnce(&U) -> R) -> R {
        let projection = self.get();
        f(&projection)
    }

    /// Watch the projection.
    ///
    /// `callback` runs immediately and then once per propagated change.
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(&U) + Send + Sync + 'static,
    {
        self.state.watchers.watch(&self.get(), callback)
    }

    pub fn key(&self) -> &str {
        &self.state.key
    }
}

/// Create a [`Selector`] in the current context with `==` as its equality.
pub fn create_selector<T, U, F>(key: impl Into<String>, select: F) -> Result<Selector<T, U>>
where
    T: CellValue,
    U: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(Option<&T>) -> U + Send + Sync + 'static,
{
    Selector::new(&Storage::current(), key, select, SelectorOptions::new())
}

/// Create a [`Selector`] in the current context with explicit options.
pub fn create_selector_with<T, U, F>(
    key: impl Into<String>,
    select: F,
    options: SelectorOptions<U>,
) -> Result<Selector<T, U>>
where
    T: CellValue,
    U: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(Option<&T>) -> U + Send + Sync + 'static,
{
    Selector::new(&Storage::current(), key, select, options)
}
