use super::options::CellOptions;
use super::value::{CellValue, ValueCell};
use super::watch::WatchGuard;
use crate::error::Result;
use crate::storage::Storage;
use std::sync::Arc;

/// A pure transition from the previous state and an action to the next state.
pub type Reducer<T, A> = Arc<dyn Fn(Option<&T>, A) -> T + Send + Sync>;

/// A [`ValueCell`] changed only by dispatching actions through a reducer.
///
/// Seeding, sync, and initial state behave exactly as for [`ValueCell`].
/// The reducer must not touch the store itself.
///
/// # Examples
///
/// ```
/// use kvcell::storage::Storage;
/// use kvcell::{CellOptions, ReducerCell};
///
/// let storage = Storage::in_memory();
/// let counter = ReducerCell::new(
///     &storage,
///     "counter",
///     |state: Option<&i64>, action: &str| match action {
///         "INC" => state.copied().unwrap_or(0) + 1,
///         "RESET" => 0,
///         _ => state.copied().unwrap_or(0),
///     },
///     CellOptions::new().initial_state(0),
/// )
/// .unwrap();
///
/// counter.dispatch("INC").unwrap();
/// counter.dispatch("INC").unwrap();
/// assert_eq!(counter.get(), Some(2));
/// assert_eq!(storage.read("counter").as_deref(), Some("2"));
/// ```
pub struct ReducerCell<T, A> {
    cell: ValueCell<T>,
    reducer: Reducer<T, A>,
}

impl<T: CellValue, A> ReducerCell<T, A> {
    pub fn new<F>(
        storage: &Storage,
        key: impl Into<String>,
        reducer: F,
        options: CellOptions<T>,
    ) -> Result<Self>
    where
        F: Fn(Option<&T>, A) -> T + Send + Sync + 'static,
    {
        Ok(Self {
            cell: ValueCell::new(storage, key, options)?,
            reducer: Arc::new(reducer),
        })
    }

    /// Apply `action` to the cached state and write the result.
    pub fn dispatch(&self, action: A) -> Result<()> {
        self.cell.update(|prev| (self.reducer)(prev, action))
    }

    pub fn get(&self) -> Option<T> {
        self.cell.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        self.cell.with(f)
    }

    /// Watch the state. See [`ValueCell::watch`].
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(&Option<T>) + Send + Sync + 'static,
    {
        self.cell.watch(callback)
    }

    pub fn key(&self) -> &str {
        self.cell.key()
    }

    /// The underlying value cell.
    pub fn cell(&self) -> &ValueCell<T> {
        &self.cell
    }
}

/// Create a [`ReducerCell`] in the current context.
pub fn create_reducer_cell<T, A, F>(
    key: impl Into<String>,
    reducer: F,
    options: CellOptions<T>,
) -> Result<ReducerCell<T, A>>
where
    T: CellValue,
    F: Fn(Option<&T>, A) -> T + Send + Sync + 'static,
{
    ReducerCell::new(&Storage::current(), key, reducer, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    fn arithmetic(state: Option<&i64>, action: &str) -> i64 {
        match action {
            "RESET" => 0,
            "INCREMENT" => state.copied().unwrap_or_default() + 1,
            "DECREMENT" => state.copied().unwrap_or_default() - 1,
            _ => -1,
        }
    }

    #[test]
    fn dispatch_updates_state_and_store() {
        let storage = Storage::in_memory();
        let cell = ReducerCell::new(&storage, "reducer-test", arithmetic, CellOptions::new())
            .unwrap();
        assert_eq!(cell.get(), None);
        assert_eq!(storage.read("reducer-test").as_deref(), Some("undefined"));

        for (action, expected) in [
            ("RESET", 0),
            ("INCREMENT", 1),
            ("INCREMENT", 2),
            ("DECREMENT", 1),
            ("INVALID_OP", -1),
        ] {
            cell.dispatch(action).unwrap();
            assert_eq!(cell.get(), Some(expected));
            assert_eq!(
                storage.read("reducer-test"),
                Some(expected.to_string()),
                "after {action}"
            );
        }
    }

    #[test]
    fn reducer_receives_previous_state_and_action() {
        let storage = Storage::in_memory();
        let cell = ReducerCell::new(
            &storage,
            "log",
            |state: Option<&Vec<String>>, action: String| {
                let mut next = state.cloned().unwrap_or_default();
                next.push(action);
                next
            },
            CellOptions::new().initial_state(vec!["start".to_string()]),
        )
        .unwrap();

        cell.dispatch("a".to_string()).unwrap();
        cell.dispatch("b".to_string()).unwrap();
        assert_eq!(
            cell.get(),
            Some(vec!["start".to_string(), "a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn sync_off_cells_diverge() {
        let storage = Storage::in_memory();
        let first = ReducerCell::new(
            &storage,
            "sync-off",
            arithmetic,
            CellOptions::new().initial_state(5).sync(false),
        )
        .unwrap();
        let second = ReducerCell::new(
            &storage,
            "sync-off",
            arithmetic,
            CellOptions::new().initial_state(10).sync(false),
        )
        .unwrap();
        assert_eq!(first.get(), Some(5));
        assert_eq!(second.get(), Some(5));

        first.dispatch("INCREMENT").unwrap();
        assert_eq!(first.get(), Some(6));
        assert_eq!(second.get(), Some(5));
        assert_eq!(storage.read("sync-off").as_deref(), Some("6"));

        second.dispatch("RESET").unwrap();
        assert_eq!(first.get(), Some(6));
        assert_eq!(second.get(), Some(0));
        assert_eq!(storage.read("sync-off").as_deref(), Some("0"));
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct Todos {
        todos: Vec<String>,
        completed: Vec<String>,
    }

    enum TodoAction {
        Add(String),
        MarkComplete(usize),
    }

    fn todos(state: Option<&Todos>, action: TodoAction) -> Todos {
        let mut next = state.cloned().unwrap_or(Todos {
            todos: Vec::new(),
            completed: Vec::new(),
        });
        match action {
            TodoAction::Add(todo) => next.todos.insert(0, todo),
            TodoAction::MarkComplete(idx) => {
                let done = next.todos.remove(idx);
                next.completed.insert(0, done);
            }
        }
        next
    }

    #[test]
    fn complex_state_syncs_between_cells() {
        let storage = Storage::in_memory();
        let initial = Todos {
            todos: vec!["1".into(), "2".into()],
            completed: vec!["10".into()],
        };
        let first = ReducerCell::new(
            &storage,
            "objects",
            todos,
            CellOptions::new().initial_state(initial.clone()),
        )
        .unwrap();
        let second = ReducerCell::new(&storage, "objects", todos, CellOptions::new()).unwrap();
        assert_eq!(second.get(), Some(initial));

        first.dispatch(TodoAction::Add("new todo".into())).unwrap();
        first.dispatch(TodoAction::MarkComplete(1)).unwrap();

        let expected = Todos {
            todos: vec!["new todo".into(), "2".into()],
            completed: vec!["1".into(), "10".into()],
        };
        assert_eq!(first.get(), Some(expected.clone()));
        assert_eq!(second.get(), Some(expected.clone()));
        assert_eq!(
            storage.read("objects"),
            Some(serde_json::to_string(&expected).unwrap())
        );
    }
}
