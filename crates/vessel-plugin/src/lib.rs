//! Component registry and capability dispatch for Vessel.
//!
//! Plugins register named components per [`Category`] (guests, hosts,
//! providers, synced folders, ...) behind lazy factories, and attach
//! capability implementations to component names. Guests and hosts may declare
//! parents; capability lookup and detection both walk that forest
//! depth-first, left to right, rejecting cycles. [`RegistrySnapshot`] exposes
//! the same answers to out-of-process plugin hosts.

pub mod component;
pub mod forest;
pub mod host;
pub mod plugin;
pub mod probe;
pub mod registry;
pub mod snapshot;

pub use component::{CapabilityImpl, Component, ComponentEntry, ComponentSpec};
pub use forest::{ancestry, capability_owner, pick_most_specific, specificity, CapabilityIndex, Forest};
pub use host::CapabilityHost;
pub use plugin::{CapabilitySpec, PluginSpec};
pub use probe::{FactProbe, Probe};
pub use registry::{Registry, ResolvedCapability};
pub use snapshot::{ComponentRecord, RegistrySnapshot};

use thiserror::Error;
use vessel_schema::{CapabilityName, Category, ComponentName};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unknown {category} component: '{name}'")]
    UnknownComponent {
        category: Category,
        name: ComponentName,
    },
    #[error("{category} '{name}' (and its parents) does not support capability '{capability}'")]
    CapabilityNotSupported {
        category: Category,
        name: ComponentName,
        capability: CapabilityName,
    },
    #[error("capability '{capability}' on {category} '{owner}' is not of the requested type")]
    CapabilityTypeMismatch {
        category: Category,
        owner: ComponentName,
        capability: CapabilityName,
    },
    #[error("invalid {category} component graph: cycle {}", join_names(.cycle, " -> "))]
    InvalidComponentGraph {
        category: Category,
        cycle: Vec<ComponentName>,
    },
    #[error("ambiguous {category} detection: {} match at equal specificity", join_names(.candidates, ", "))]
    AmbiguousDetection {
        category: Category,
        candidates: Vec<ComponentName>,
    },
    #[error("could not determine {category} type")]
    DetectionFailed { category: Category },
}

fn join_names(names: &[ComponentName], sep: &str) -> String {
    names
        .iter()
        .map(ComponentName::as_str)
        .collect::<Vec<_>>()
        .join(sep)
}
