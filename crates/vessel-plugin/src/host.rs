use crate::forest::{self, CapabilityIndex};
use crate::registry::{Registry, ResolvedCapability};
use crate::PluginError;
use std::any::Any;
use std::sync::Arc;
use vessel_schema::{Category, ComponentName};

/// A chosen guest or host bound to its ancestry, ready to dispatch
/// capabilities.
#[derive(Debug)]
pub struct CapabilityHost<'r> {
    registry: &'r Registry,
    category: Category,
    name: ComponentName,
    chain: Vec<ComponentName>,
}

impl<'r> CapabilityHost<'r> {
    pub fn new(
        registry: &'r Registry,
        category: Category,
        name: ComponentName,
    ) -> Result<Self, PluginError> {
        let chain = forest::ancestry(registry, category, &name)?;
        Ok(Self {
            registry,
            category,
            name,
            chain,
        })
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    /// The component followed by its ancestors, in lookup order.
    pub fn chain(&self) -> &[ComponentName] {
        &self.chain
    }

    pub fn has(&self, capability: &str) -> bool {
        self.chain
            .iter()
            .any(|n| self.registry.declares(self.category, n, capability))
    }

    pub fn get(&self, capability: &str) -> Result<ResolvedCapability, PluginError> {
        self.registry
            .resolve_capability(self.category, &self.name, capability)
    }

    pub fn get_as<T: Any + Send + Sync>(&self, capability: &str) -> Result<Arc<T>, PluginError> {
        self.registry
            .resolve_capability_as::<T>(self.category, &self.name, capability)
    }
}
