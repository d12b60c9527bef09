use crate::component::{CapabilityImpl, ComponentSpec};
use std::any::Any;
use std::sync::Arc;
use vessel_schema::{CapabilityName, Category, ComponentName};

/// One capability registration inside a [`PluginSpec`].
#[derive(Clone)]
pub struct CapabilitySpec {
    pub category: Category,
    pub component: ComponentName,
    pub capability: CapabilityName,
    pub implementation: CapabilityImpl,
}

impl std::fmt::Debug for CapabilitySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySpec")
            .field("category", &self.category)
            .field("component", &self.component)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// Everything a plugin contributes, registered and unregistered as a unit.
#[derive(Debug, Clone)]
pub struct PluginSpec {
    pub name: String,
    pub components: Vec<ComponentSpec>,
    pub capabilities: Vec<CapabilitySpec>,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    #[must_use]
    pub fn component(mut self, spec: ComponentSpec) -> Self {
        self.components.push(spec);
        self
    }

    #[must_use]
    pub fn capability<T: Any + Send + Sync>(
        mut self,
        category: Category,
        component: impl Into<ComponentName>,
        capability: impl Into<CapabilityName>,
        implementation: T,
    ) -> Self {
        self.capabilities.push(CapabilitySpec {
            category,
            component: component.into(),
            capability: capability.into(),
            implementation: Arc::new(implementation),
        });
        self
    }
}
