//! Cells that mirror one store key.
//!
//! - `ValueCell<T>` - the last-known value of a key, written through the store
//! - `ReducerCell<T, A>` - a value cell driven by a pure transition function
//! - `WatchGuard` - keeps an observer callback registered

mod options;
mod reducer;
mod value;
mod watch;

pub use options::CellOptions;
pub use reducer::{create_reducer_cell, Reducer, ReducerCell};
pub use value::{create_value_cell, CellValue, ValueCell};
pub use watch::WatchGuard;

pub(crate) use watch::Watchers;
