use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Key under which branch decision steps leave their decision.
pub const RESULT_KEY: &str = "result";
/// Set to `true` to stop the pipeline before or after the current step.
pub const INTERRUPTED_KEY: &str = "interrupted";
/// Name of the action being run, set by [`crate::Runner`].
pub const ACTION_NAME_KEY: &str = "action_name";

/// Shared state for one pipeline run.
///
/// Values are arbitrary and keyed by string; a value written by one step is
/// seen unchanged by every later step until someone overwrites it.
#[derive(Default)]
pub struct Context {
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for seeding a context.
    #[must_use]
    pub fn with<T: Any + Send>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Typed read. `None` if the key is missing or holds another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Remove and return a value. A value of another type is left in place.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// `true` only when the key holds the boolean `true`.
    pub fn flag(&self, key: &str) -> bool {
        self.get::<bool>(key).copied().unwrap_or(false)
    }

    pub fn set_result(&mut self, value: bool) {
        self.insert(RESULT_KEY, value);
    }

    pub fn result(&self) -> Option<bool> {
        self.get::<bool>(RESULT_KEY).copied()
    }

    pub fn interrupted(&self) -> bool {
        self.flag(INTERRUPTED_KEY)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}
