/// Per-cell configuration.
///
/// # Examples
///
/// ```
/// use kvcell::CellOptions;
///
/// let options = CellOptions::new().initial_state(5).sync(false);
/// assert_eq!(options.initial_state, Some(5));
/// assert!(!options.sync);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CellOptions<T> {
    /// Value used, and persisted, only when the store has no entry for the key.
    pub initial_state: Option<T>,
    /// Whether the cell follows notifications for its key.
    pub sync: bool,
}

impl<T> CellOptions<T> {
    pub fn new() -> Self {
        Self {
            initial_state: None,
            sync: true,
        }
    }

    pub fn initial_state(mut self, value: T) -> Self {
        self.initial_state = Some(value);
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

impl<T> Default for CellOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}
