//! Reducer-driven writes outside any observer.

mod dispatcher;

pub use dispatcher::{create_dispatcher, Dispatcher};
