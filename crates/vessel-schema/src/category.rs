use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Plugin component category. Names are unique within a category only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Guest,
    Host,
    Provider,
    Communicator,
    SyncedFolder,
    Command,
    Provisioner,
    Config,
    Push,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Guest,
        Category::Host,
        Category::Provider,
        Category::Communicator,
        Category::SyncedFolder,
        Category::Command,
        Category::Provisioner,
        Category::Config,
        Category::Push,
    ];

    /// Priority assigned to components registered without one.
    pub fn default_priority(self) -> i64 {
        match self {
            Category::Provider => 5,
            Category::SyncedFolder => 10,
            _ => 0,
        }
    }

    /// Whether components in this category declare parents and a detection
    /// predicate.
    pub fn supports_parents(self) -> bool {
        matches!(self, Category::Guest | Category::Host)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Guest => "guest",
            Category::Host => "host",
            Category::Provider => "provider",
            Category::Communicator => "communicator",
            Category::SyncedFolder => "synced_folder",
            Category::Command => "command",
            Category::Provisioner => "provisioner",
            Category::Config => "config",
            Category::Push => "push",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown component category: '{0}'")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ParseCategoryError(s.to_owned()))
    }
}
