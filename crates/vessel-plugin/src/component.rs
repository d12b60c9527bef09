use crate::probe::Probe;
use std::any::Any;
use std::sync::{Arc, OnceLock};
use vessel_schema::{Category, ComponentName};

/// A plugin-supplied implementation registered under a category and name.
pub trait Component: Send + Sync {
    /// Detection predicate, consulted for guests and hosts.
    fn detect(&self, _probe: &dyn Probe) -> bool {
        false
    }

    /// Whether this implementation can be used at all in the probed
    /// environment (ranked by priority among competing implementations).
    fn usable(&self, _probe: &dyn Probe) -> bool {
        true
    }
}

pub type ComponentFactory = Arc<dyn Fn() -> Arc<dyn Component> + Send + Sync>;

/// Opaque capability implementation. Its signature is agreed between the
/// registering plugin and the caller; the registry only stores it.
pub type CapabilityImpl = Arc<dyn Any + Send + Sync>;

/// Registration request for a single component.
#[derive(Clone)]
pub struct ComponentSpec {
    pub category: Category,
    pub name: ComponentName,
    pub priority: Option<i64>,
    pub parents: Vec<ComponentName>,
    pub(crate) factory: ComponentFactory,
}

impl ComponentSpec {
    pub fn new<C, F>(category: Category, name: impl Into<ComponentName>, factory: F) -> Self
    where
        C: Component + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            category,
            name: name.into(),
            priority: None,
            parents: Vec::new(),
            factory: Arc::new(move || Arc::new(factory()) as Arc<dyn Component>),
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<ComponentName>) -> Self {
        self.parents.push(parent.into());
        self
    }

    #[must_use]
    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ComponentName>,
    {
        self.parents.extend(parents.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("category", &self.category)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("parents", &self.parents)
            .finish_non_exhaustive()
    }
}

/// A registered component. The factory runs on first use and the instance
/// is shared afterwards.
pub struct ComponentEntry {
    category: Category,
    name: ComponentName,
    priority: Option<i64>,
    parents: Vec<ComponentName>,
    plugin: Option<String>,
    seq: u64,
    factory: ComponentFactory,
    instance: OnceLock<Arc<dyn Component>>,
}

impl ComponentEntry {
    pub(crate) fn new(spec: ComponentSpec, plugin: Option<String>, seq: u64) -> Self {
        Self {
            category: spec.category,
            name: spec.name,
            priority: spec.priority,
            parents: spec.parents,
            plugin,
            seq,
            factory: spec.factory,
            instance: OnceLock::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn parents(&self) -> &[ComponentName] {
        &self.parents
    }

    /// Declared priority, or the category baseline when unset.
    pub fn priority(&self) -> i64 {
        self.priority
            .unwrap_or_else(|| self.category.default_priority())
    }

    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// Registration sequence number; lower registered earlier.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_instantiated(&self) -> bool {
        self.instance.get().is_some()
    }

    pub fn instance(&self) -> Arc<dyn Component> {
        Arc::clone(self.instance.get_or_init(|| (self.factory)()))
    }
}

impl std::fmt::Debug for ComponentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentEntry")
            .field("category", &self.category)
            .field("name", &self.name)
            .field("priority", &self.priority())
            .field("parents", &self.parents)
            .field("plugin", &self.plugin)
            .field("instantiated", &self.is_instantiated())
            .finish_non_exhaustive()
    }
}
