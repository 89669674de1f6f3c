//! Access to the shared key-value store.
//!
//! This module provides the store accessor used by every cell, the backend
//! trait it writes through, and the per-thread stack of execution contexts.

mod backend;
mod context;
mod storage;

pub use backend::{MemoryBackend, StorageBackend};
pub use storage::{Notification, Storage, Subscription};
