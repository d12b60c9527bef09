use crate::types::{ComponentName, MachineName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported config_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("machine '{machine}' has an invalid synced folder '{spec}', expected '<host>:<guest>'")]
    InvalidSyncedFolder { machine: String, spec: String },
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigV1 {
    pub config_version: u32,
    #[serde(default)]
    pub locks: LocksSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub detection: DetectionSection,
    #[serde(default)]
    pub machines: BTreeMap<MachineName, MachineSection>,
}

impl Default for ConfigV1 {
    fn default() -> Self {
        Self {
            config_version: 1,
            locks: LocksSection::default(),
            registry: RegistrySection::default(),
            detection: DetectionSection::default(),
            machines: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LocksSection {
    /// Attempts after the first before giving up on a busy lock.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl LocksSection {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for LocksSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

/// How equal-priority usable implementations are ordered.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    FirstRegistered,
    LastRegistered,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    #[serde(default)]
    pub tie_break: TieBreak,
}

/// Explicit overrides that bypass detection predicates.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DetectionSection {
    #[serde(default)]
    pub guest: Option<ComponentName>,
    #[serde(default)]
    pub host: Option<ComponentName>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MachineSection {
    #[serde(default = "default_provider")]
    pub provider: ComponentName,
    #[serde(default = "default_box", rename = "box")]
    pub box_name: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub guest: Option<ComponentName>,
    #[serde(default)]
    pub synced_folders: Vec<String>,
    /// Inline shell provisioning commands, run after creation.
    #[serde(default)]
    pub provision: Vec<String>,
    /// Facts handed to guest detection (e.g. `os_id = "ubuntu"`).
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
}

impl Default for MachineSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            box_name: default_box(),
            hostname: None,
            guest: None,
            synced_folders: Vec::new(),
            provision: Vec::new(),
            facts: BTreeMap::new(),
        }
    }
}

impl MachineSection {
    /// Split every synced folder declaration into `(host, guest)` pairs.
    pub fn synced_folder_pairs(&self) -> Vec<(String, String)> {
        self.synced_folders
            .iter()
            .filter_map(|spec| {
                spec.split_once(':')
                    .map(|(h, g)| (h.to_owned(), g.to_owned()))
            })
            .collect()
    }
}

fn default_retries() -> u32 {
    30
}

fn default_retry_interval_ms() -> u64 {
    500
}

fn default_provider() -> ComponentName {
    ComponentName::new("mock")
}

fn default_box() -> String {
    "base".to_owned()
}

impl ConfigV1 {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_version != 1 {
            return Err(ConfigError::UnsupportedVersion(self.config_version));
        }
        for (name, machine) in &self.machines {
            for spec in &machine.synced_folders {
                let valid = spec
                    .split_once(':')
                    .is_some_and(|(h, g)| !h.trim().is_empty() && !g.trim().is_empty());
                if !valid {
                    return Err(ConfigError::InvalidSyncedFolder {
                        machine: name.to_string(),
                        spec: spec.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

pub fn parse_config_str(input: &str) -> Result<ConfigV1, ConfigError> {
    let config: ConfigV1 = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<ConfigV1, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
