use crate::component::{CapabilityImpl, ComponentEntry, ComponentSpec};
use crate::forest::{self, CapabilityIndex, Forest};
use crate::host::CapabilityHost;
use crate::plugin::PluginSpec;
use crate::probe::Probe;
use crate::snapshot::{ComponentRecord, RegistrySnapshot};
use crate::PluginError;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use vessel_schema::{CapabilityName, Category, ComponentName, TieBreak};

type OwnerKey = (Category, ComponentName, CapabilityName);

struct CapabilityRecord {
    implementation: CapabilityImpl,
    plugin: Option<String>,
}

#[derive(Default)]
struct CategoryTable {
    order: Vec<ComponentName>,
    entries: HashMap<ComponentName, ComponentEntry>,
    capabilities: HashMap<ComponentName, BTreeMap<CapabilityName, CapabilityRecord>>,
}

/// A capability implementation together with the component that supplied it.
#[derive(Clone)]
pub struct ResolvedCapability {
    pub owner: ComponentName,
    pub capability: CapabilityName,
    pub implementation: CapabilityImpl,
}

impl ResolvedCapability {
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.implementation).downcast::<T>().ok()
    }
}

impl std::fmt::Debug for ResolvedCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCapability")
            .field("owner", &self.owner)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// Component registry and capability table for every category.
///
/// Populated at startup through `&mut self`; all lookups take `&self` and are
/// safe to call from many threads at once. Capability owners are memoized
/// per `(category, name, capability)` and the memo is dropped on every
/// mutation.
pub struct Registry {
    tables: BTreeMap<Category, CategoryTable>,
    tie_break: TieBreak,
    next_seq: u64,
    owners: RwLock<HashMap<OwnerKey, ComponentName>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (category, table) in &self.tables {
            map.entry(category, &table.order);
        }
        map.finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_tie_break(TieBreak::default())
    }

    pub fn with_tie_break(tie_break: TieBreak) -> Self {
        Self {
            tables: BTreeMap::new(),
            tie_break,
            next_seq: 0,
            owners: RwLock::new(HashMap::new()),
        }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    fn invalidate(&mut self) {
        match self.owners.get_mut() {
            Ok(map) => map.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn table(&self, category: Category) -> Option<&CategoryTable> {
        self.tables.get(&category)
    }

    /// Record a component. The factory is not run here.
    ///
    /// Registering an existing name replaces the earlier entry but keeps its
    /// position in registration order.
    pub fn register(&mut self, spec: ComponentSpec) {
        self.register_from(spec, None);
    }

    fn register_from(&mut self, mut spec: ComponentSpec, plugin: Option<String>) {
        if !spec.parents.is_empty() && !spec.category.supports_parents() {
            warn!(
                "{} '{}' declares parents, ignored outside guest and host",
                spec.category, spec.name
            );
            spec.parents.clear();
        }

        let table = self.tables.entry(spec.category).or_default();
        let seq = if let Some(existing) = table.entries.get(&spec.name) {
            debug!("overriding {} component '{}'", spec.category, spec.name);
            existing.seq()
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            table.order.push(spec.name.clone());
            debug!(
                "registered {} component '{}' (parents: {:?})",
                spec.category, spec.name, spec.parents
            );
            seq
        };
        let name = spec.name.clone();
        table.entries.insert(name, ComponentEntry::new(spec, plugin, seq));
        self.invalidate();
    }

    /// Attach a capability implementation to a component name. The
    /// component itself may be registered later.
    pub fn register_capability<T: Any + Send + Sync>(
        &mut self,
        category: Category,
        name: impl Into<ComponentName>,
        capability: impl Into<CapabilityName>,
        implementation: T,
    ) {
        self.register_capability_impl(
            category,
            name.into(),
            capability.into(),
            Arc::new(implementation),
            None,
        );
    }

    fn register_capability_impl(
        &mut self,
        category: Category,
        name: ComponentName,
        capability: CapabilityName,
        implementation: CapabilityImpl,
        plugin: Option<String>,
    ) {
        debug!("registered capability '{capability}' on {category} '{name}'");
        self.tables
            .entry(category)
            .or_default()
            .capabilities
            .entry(name)
            .or_default()
            .insert(
                capability,
                CapabilityRecord {
                    implementation,
                    plugin,
                },
            );
        self.invalidate();
    }

    pub fn register_plugin(&mut self, plugin: PluginSpec) {
        let PluginSpec {
            name,
            components,
            capabilities,
        } = plugin;
        debug!(
            "activating plugin '{name}' ({} components, {} capabilities)",
            components.len(),
            capabilities.len()
        );
        for spec in components {
            self.register_from(spec, Some(name.clone()));
        }
        for cap in capabilities {
            self.register_capability_impl(
                cap.category,
                cap.component,
                cap.capability,
                cap.implementation,
                Some(name.clone()),
            );
        }
    }

    /// Remove every component and capability a plugin contributed. Returns
    /// how many registrations were dropped.
    pub fn unregister_plugin(&mut self, plugin: &str) -> usize {
        let mut removed = 0;
        for table in self.tables.values_mut() {
            let before = table.entries.len();
            table
                .entries
                .retain(|_, entry| entry.plugin() != Some(plugin));
            removed += before - table.entries.len();
            let entries = &table.entries;
            table.order.retain(|name| entries.contains_key(name));

            for caps in table.capabilities.values_mut() {
                let before = caps.len();
                caps.retain(|_, record| record.plugin.as_deref() != Some(plugin));
                removed += before - caps.len();
            }
            table.capabilities.retain(|_, caps| !caps.is_empty());
        }
        debug!("unregistered plugin '{plugin}' ({removed} registrations)");
        self.invalidate();
        removed
    }

    pub fn lookup(&self, category: Category, name: &str) -> Result<&ComponentEntry, PluginError> {
        self.table(category)
            .and_then(|t| t.entries.get(name))
            .ok_or_else(|| PluginError::UnknownComponent {
                category,
                name: ComponentName::new(name),
            })
    }

    pub fn contains(&self, category: Category, name: &str) -> bool {
        self.table(category)
            .is_some_and(|t| t.entries.contains_key(name))
    }

    pub fn parents_of(
        &self,
        category: Category,
        name: &str,
    ) -> Result<&[ComponentName], PluginError> {
        self.lookup(category, name).map(ComponentEntry::parents)
    }

    pub fn priority_of(&self, category: Category, name: &str) -> Result<i64, PluginError> {
        self.lookup(category, name).map(ComponentEntry::priority)
    }

    /// Components of a category in registration order.
    pub fn components(&self, category: Category) -> Vec<&ComponentEntry> {
        self.table(category)
            .map(|t| t.order.iter().filter_map(|n| t.entries.get(n)).collect())
            .unwrap_or_default()
    }

    /// Capability names a component declares itself, sorted.
    pub fn capabilities_of(&self, category: Category, name: &str) -> Vec<CapabilityName> {
        self.table(category)
            .and_then(|t| t.capabilities.get(name))
            .map(|caps| caps.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn owner_of(
        &self,
        category: Category,
        name: &str,
        capability: &str,
    ) -> Result<Option<ComponentName>, PluginError> {
        self.lookup(category, name)?;
        let key = (
            category,
            ComponentName::new(name),
            CapabilityName::new(capability),
        );
        if let Some(owner) = self.owners.read().ok().and_then(|m| m.get(&key).cloned()) {
            return Ok(Some(owner));
        }

        let owner = forest::capability_owner(self, category, name, capability)?;
        if let Some(owner) = &owner {
            if let Ok(mut map) = self.owners.write() {
                map.insert(key, owner.clone());
            }
        }
        Ok(owner)
    }

    /// Find `capability` on `name` or, failing that, on its nearest ancestor.
    pub fn resolve_capability(
        &self,
        category: Category,
        name: &str,
        capability: &str,
    ) -> Result<ResolvedCapability, PluginError> {
        let owner = self.owner_of(category, name, capability)?.ok_or_else(|| {
            PluginError::CapabilityNotSupported {
                category,
                name: ComponentName::new(name),
                capability: CapabilityName::new(capability),
            }
        })?;
        let implementation = self
            .table(category)
            .and_then(|t| t.capabilities.get(&owner))
            .and_then(|caps| caps.get(capability))
            .map(|record| Arc::clone(&record.implementation))
            .ok_or_else(|| PluginError::CapabilityNotSupported {
                category,
                name: ComponentName::new(name),
                capability: CapabilityName::new(capability),
            })?;
        debug!("resolved capability '{capability}' for {category} '{name}' via '{owner}'");
        Ok(ResolvedCapability {
            owner,
            capability: CapabilityName::new(capability),
            implementation,
        })
    }

    /// Typed variant of [`Registry::resolve_capability`].
    pub fn resolve_capability_as<T: Any + Send + Sync>(
        &self,
        category: Category,
        name: &str,
        capability: &str,
    ) -> Result<Arc<T>, PluginError> {
        let resolved = self.resolve_capability(category, name, capability)?;
        resolved
            .downcast::<T>()
            .ok_or(PluginError::CapabilityTypeMismatch {
                category,
                owner: resolved.owner,
                capability: resolved.capability,
            })
    }

    pub fn supports_capability(
        &self,
        category: Category,
        name: &str,
        capability: &str,
    ) -> Result<bool, PluginError> {
        Ok(self.owner_of(category, name, capability)?.is_some())
    }

    /// Evaluate every predicate in `category` and return the most specific
    /// match.
    pub fn detect(&self, category: Category, probe: &dyn Probe) -> Result<ComponentName, PluginError> {
        let matched: Vec<ComponentName> = self
            .components(category)
            .into_iter()
            .filter(|entry| entry.instance().detect(probe))
            .map(|entry| entry.name().clone())
            .collect();
        debug!("{category} detection matched {matched:?}");
        let picked = forest::pick_most_specific(self, category, &matched)?;
        debug!("detected {category} '{picked}'");
        Ok(picked)
    }

    /// Use `explicit` when given, otherwise run detection.
    pub fn detect_or(
        &self,
        category: Category,
        explicit: Option<&str>,
        probe: &dyn Probe,
    ) -> Result<ComponentName, PluginError> {
        match explicit {
            Some(name) => {
                self.lookup(category, name)?;
                debug!("using explicit {category} '{name}'");
                Ok(ComponentName::new(name))
            }
            None => self.detect(category, probe),
        }
    }

    /// Components ordered by priority, highest first, equal priorities per
    /// the configured tie-break.
    pub fn ranked(&self, category: Category) -> Vec<&ComponentEntry> {
        let mut entries = self.components(category);
        match self.tie_break {
            TieBreak::FirstRegistered => {
                entries.sort_by(|a, b| b.priority().cmp(&a.priority()).then(a.seq().cmp(&b.seq())));
            }
            TieBreak::LastRegistered => {
                entries.sort_by(|a, b| b.priority().cmp(&a.priority()).then(b.seq().cmp(&a.seq())));
            }
        }
        entries
    }

    /// The highest-ranked component whose `usable` check passes.
    pub fn best_usable(&self, category: Category, probe: &dyn Probe) -> Option<ComponentName> {
        let best = self
            .ranked(category)
            .into_iter()
            .find(|entry| entry.instance().usable(probe))
            .map(|entry| entry.name().clone());
        debug!("best usable {category}: {best:?}");
        best
    }

    /// Walk every forest once, reporting dangling parents and cycles.
    pub fn validate(&self) -> Result<(), PluginError> {
        for category in self.tables.keys() {
            forest::validate_category(self, *category)?;
        }
        Ok(())
    }

    /// Bind a component (explicit or detected) to its ancestry.
    pub fn capability_host(
        &self,
        category: Category,
        explicit: Option<&str>,
        probe: &dyn Probe,
    ) -> Result<CapabilityHost<'_>, PluginError> {
        let name = self.detect_or(category, explicit, probe)?;
        CapabilityHost::new(self, category, name)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::default();
        for category in self.tables.keys() {
            let records = self
                .components(*category)
                .into_iter()
                .map(|entry| ComponentRecord {
                    name: entry.name().clone(),
                    parents: entry.parents().to_vec(),
                    priority: entry.priority(),
                    capabilities: self.capabilities_of(*category, entry.name()),
                    plugin: entry.plugin().map(str::to_owned),
                })
                .collect();
            snapshot.insert(*category, records);
        }
        snapshot
    }
}

impl Forest for Registry {
    fn declared_parents(&self, category: Category, name: &str) -> Option<&[ComponentName]> {
        self.table(category)
            .and_then(|t| t.entries.get(name))
            .map(ComponentEntry::parents)
    }

    fn component_names(&self, category: Category) -> Vec<ComponentName> {
        self.table(category)
            .map(|t| t.order.clone())
            .unwrap_or_default()
    }
}

impl CapabilityIndex for Registry {
    fn declares(&self, category: Category, name: &str, capability: &str) -> bool {
        self.table(category)
            .and_then(|t| t.capabilities.get(name))
            .is_some_and(|caps| caps.contains_key(capability))
    }
}
