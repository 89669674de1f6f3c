//! Read-only projections of a store key.

mod selector;

pub use selector::{create_selector, create_selector_with, Selector, SelectorOptions};
