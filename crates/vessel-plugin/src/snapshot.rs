//! Serializable mirror of the registry for out-of-process plugin hosts.
//!
//! A snapshot answers parent, capability and detection queries through the
//! same walk functions as [`crate::Registry`]; predicates themselves stay with
//! the caller, which passes in the names whose predicates matched.

use crate::forest::{self, CapabilityIndex, Forest};
use crate::PluginError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vessel_schema::{CapabilityName, Category, ComponentName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub name: ComponentName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<ComponentName>,
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    categories: BTreeMap<Category, Vec<ComponentRecord>>,
}

impl RegistrySnapshot {
    /// Set the records of a category, in registration order.
    pub fn insert(&mut self, category: Category, records: Vec<ComponentRecord>) {
        self.categories.insert(category, records);
    }

    pub fn records(&self, category: Category) -> &[ComponentRecord] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn record(&self, category: Category, name: &str) -> Option<&ComponentRecord> {
        self.records(category).iter().find(|r| r.name == name)
    }

    pub fn parents(&self, category: Category, name: &str) -> Result<Vec<ComponentName>, PluginError> {
        self.record(category, name)
            .map(|r| r.parents.clone())
            .ok_or_else(|| PluginError::UnknownComponent {
                category,
                name: ComponentName::new(name),
            })
    }

    pub fn has_capability(
        &self,
        category: Category,
        name: &str,
        capability: &str,
    ) -> Result<bool, PluginError> {
        Ok(self.capability_owner(category, name, capability)?.is_some())
    }

    pub fn capability_owner(
        &self,
        category: Category,
        name: &str,
        capability: &str,
    ) -> Result<Option<ComponentName>, PluginError> {
        forest::capability_owner(self, category, name, capability)
    }

    /// Choose among components whose predicates matched, exactly as
    /// [`crate::Registry::detect`] would.
    pub fn pick_detected(
        &self,
        category: Category,
        matched: &[ComponentName],
    ) -> Result<ComponentName, PluginError> {
        forest::pick_most_specific(self, category, matched)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

impl Forest for RegistrySnapshot {
    fn declared_parents(&self, category: Category, name: &str) -> Option<&[ComponentName]> {
        self.record(category, name).map(|r| r.parents.as_slice())
    }

    fn component_names(&self, category: Category) -> Vec<ComponentName> {
        self.records(category).iter().map(|r| r.name.clone()).collect()
    }
}

impl CapabilityIndex for RegistrySnapshot {
    fn declares(&self, category: Category, name: &str, capability: &str) -> bool {
        self.record(category, name)
            .is_some_and(|r| r.capabilities.iter().any(|c| c == capability))
    }
}
