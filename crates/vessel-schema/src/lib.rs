//! Configuration parsing, component categories, and identifier types for Vessel.
//!
//! This crate defines the schema layer shared by every other crate: the TOML
//! orchestrator configuration (`ConfigV1`), the plugin `Category` taxonomy with
//! its priority baselines, and string newtypes (`ComponentName`,
//! `CapabilityName`, `MachineName`) that keep identifiers from being mixed up.

pub mod category;
pub mod config;
pub mod types;

pub use category::{Category, ParseCategoryError};
pub use config::{
    parse_config_file, parse_config_str, ConfigError, ConfigV1, DetectionSection, LocksSection,
    MachineSection, RegistrySection, TieBreak,
};
pub use types::{CapabilityName, ComponentName, MachineName};
