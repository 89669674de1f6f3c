//! # kvcell
//!
//! Reactive state cells persisted in a shared key-value store.
//!
//! Several independent contexts (think browser tabs over one per-origin
//! store) can observe and mutate a named value as if it were shared
//! in-memory state. Every write is followed by a synchronous change
//! notification, so observers of a key converge on the same value.
//!
//! ## Observers
//!
//! - `ValueCell<T>` - the last-known value of a key, with `set`/`update`
//! - `ReducerCell<T, A>` - a value cell driven by `dispatch(action)`
//! - `Selector<T, U>` - a projection that only propagates when it changes
//!
//! ## Outside observers
//!
//! - `Dispatcher<T, A>` - reducer-driven writes with no cached state
//!
//! ## Plumbing
//!
//! - [`codec`] - the store's string format, including the absent value
//! - [`storage`] - the store accessor, backends, and execution contexts
//!
//! ```
//! use kvcell::storage::Storage;
//! use kvcell::{CellOptions, ReducerCell, ValueCell};
//!
//! let storage = Storage::in_memory();
//! let reduce = |state: Option<&i32>, action: &str| match action {
//!     "INC" => state.copied().unwrap_or(0) + 1,
//!     "RESET" => 0,
//!     _ => state.copied().unwrap_or(0),
//! };
//!
//! let counter = ReducerCell::new(&storage, "counter", reduce, CellOptions::new().initial_state(0)).unwrap();
//! let mirror: ValueCell<i32> = ValueCell::new(&storage, "counter", CellOptions::new()).unwrap();
//!
//! counter.dispatch("INC").unwrap();
//! assert_eq!(mirror.get(), Some(1));
//! ```

pub mod cell;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod selector;
pub mod storage;

// Re-export main types for convenience
pub use cell::{
    create_reducer_cell, create_value_cell, CellOptions, CellValue, Reducer, ReducerCell,
    ValueCell, WatchGuard,
};
pub use dispatch::{create_dispatcher, Dispatcher};
pub use error::{Error, Result};
pub use selector::{create_selector, create_selector_with, Selector, SelectorOptions};
pub use storage::{MemoryBackend, Notification, Storage, StorageBackend, Subscription};
