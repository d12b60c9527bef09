use std::collections::{BTreeMap, BTreeSet};

/// Read-only view of a live machine or host that detection predicates and
/// usability checks query.
pub trait Probe {
    /// A named fact (e.g. `os_id`, `platform`), if known.
    fn fact(&self, key: &str) -> Option<String>;

    /// Whether a command would succeed on the probed system.
    fn test(&self, _command: &str) -> bool {
        false
    }
}

/// In-memory probe backed by a fact table and a set of passing commands.
#[derive(Debug, Clone, Default)]
pub struct FactProbe {
    facts: BTreeMap<String, String>,
    passing: BTreeSet<String>,
}

impl FactProbe {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.facts.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_passing(mut self, command: impl Into<String>) -> Self {
        self.passing.insert(command.into());
        self
    }

    pub fn set_fact(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.facts.insert(key.into(), value.into());
    }

    pub fn facts(&self) -> &BTreeMap<String, String> {
        &self.facts
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FactProbe {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            facts: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            passing: BTreeSet::new(),
        }
    }
}

impl Probe for FactProbe {
    fn fact(&self, key: &str) -> Option<String> {
        self.facts.get(key).cloned()
    }

    fn test(&self, command: &str) -> bool {
        self.passing.contains(command)
    }
}
