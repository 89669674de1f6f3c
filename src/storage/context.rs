use super::storage::Storage;
use std::cell::RefCell;
use std::sync::OnceLock;

// Thread-local stack of installed contexts
thread_local! {
    static STORAGE_STACK: RefCell<Vec<Storage>> = const { RefCell::new(Vec::new()) };
}

impl Storage {
    /// The process-wide fallback context.
    ///
    /// It has no store, so cells created without an installed context behave
    /// as in a headless environment.
    pub fn global() -> Storage {
        static GLOBAL: OnceLock<Storage> = OnceLock::new();
        GLOBAL.get_or_init(Storage::unavailable).clone()
    }

    /// The innermost context installed on this thread, or [`Storage::global`].
    pub fn current() -> Storage {
        STORAGE_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .unwrap_or_else(Self::global)
        })
    }

    /// Run `f` with `storage` as the current context.
    ///
    /// # Examples
    ///
    /// ```
    /// use kvcell::storage::Storage;
    /// use kvcell::{create_value_cell, CellOptions};
    ///
    /// let storage = Storage::in_memory();
    /// Storage::with_storage(storage.clone(), || {
    ///     let cell = create_value_cell("count", CellOptions::new().initial_state(1)).unwrap();
    ///     assert_eq!(cell.get(), Some(1));
    /// });
    /// assert_eq!(storage.read("count").as_deref(), Some("1"));
    /// ```
    pub fn with_storage<F, R>(storage: Storage, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        STORAGE_STACK.with(|stack| {
            stack.borrow_mut().push(storage);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        STORAGE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_is_headless() {
        assert!(!Storage::global().is_available());
        assert!(!Storage::current().is_available());
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let outer = Storage::in_memory();
        let inner = Storage::in_memory();

        Storage::with_storage(outer.clone(), || {
            Storage::current().write("k", "\"outer\"").unwrap();
            Storage::with_storage(inner.clone(), || {
                Storage::current().write("k", "\"inner\"").unwrap();
            });
            assert_eq!(Storage::current().read("k").as_deref(), Some("\"outer\""));
        });

        assert_eq!(inner.read("k").as_deref(), Some("\"inner\""));
        assert!(!Storage::current().is_available());
    }

    #[test]
    fn panic_pops_context() {
        let result = std::panic::catch_unwind(|| {
            Storage::with_storage(Storage::in_memory(), || panic!("boom"));
        });
        assert!(result.is_err());
        assert!(!Storage::current().is_available());
    }
}
