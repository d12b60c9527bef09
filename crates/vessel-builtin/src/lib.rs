//! Builtin plugins and lifecycle actions for Vessel.
//!
//! The guests, hosts, mock provider, synced folder strategies and shell
//! provisioner here are ordinary plugins registered into a
//! [`vessel_plugin::Registry`]. The lifecycle actions (`up`, `halt`,
//! `destroy`, `status`, `snapshot`, `package`) are pipelines of steps run by
//! the core [`vessel_core::Runner`]. Nothing is executed on a real machine:
//! capabilities produce the commands they would run, and the mock provider
//! records them in `<data_dir>/machines.json`.

pub mod actions;
pub mod caps;
pub mod environment;
pub mod folders;
pub mod guests;
pub mod hosts;
pub mod provider;
pub mod state;

pub use actions::{Action, MachineStatus};
pub use environment::Environment;
pub use state::{MachineRecord, MachineState, MachineStore};

use thiserror::Error;
use vessel_core::CoreError;
use vessel_plugin::{PluginError, PluginSpec};
use vessel_schema::ConfigError;

#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("unknown machine: '{0}'")]
    UnknownMachine(String),
    #[error("machine '{0}' is not created")]
    NotCreated(String),
    #[error("machine '{0}' already exists")]
    AlreadyExists(String),
    #[error("provider '{0}' is not usable on this host")]
    ProviderUnusable(String),
    #[error("no usable synced folder implementation for machine '{0}'")]
    NoUsableSyncedFolder(String),
    #[error("snapshot '{snapshot}' already exists on machine '{machine}'")]
    SnapshotExists { machine: String, snapshot: String },
    #[error("missing context value '{0}'")]
    MissingContext(&'static str),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Every builtin plugin, in activation order.
pub fn plugins() -> Vec<PluginSpec> {
    vec![
        guests::plugin(),
        hosts::plugin(),
        provider::plugin(),
        folders::plugin(),
        provider::shell_provisioner(),
    ]
}
