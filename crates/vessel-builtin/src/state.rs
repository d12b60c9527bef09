use crate::BuiltinError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use vessel_core::{LockManager, RetryPolicy};
use vessel_schema::{ComponentName, MachineName};

const STATE_FILE: &str = "machines.json";
const STATE_LOCK: &str = "machines";
const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Running,
    Poweroff,
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineState::Running => write!(f, "running"),
            MachineState::Poweroff => write!(f, "poweroff"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncedFolderRecord {
    pub host_path: String,
    pub guest_path: String,
    pub implementation: ComponentName,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineRecord {
    pub id: String,
    pub name: MachineName,
    pub provider: ComponentName,
    #[serde(rename = "box")]
    pub box_name: String,
    pub state: MachineState,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub synced_folders: Vec<SyncedFolderRecord>,
    #[serde(default)]
    pub snapshots: Vec<String>,
    /// Commands the machine would have run, oldest first.
    #[serde(default)]
    pub history: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MachineRecord {
    pub fn new(name: MachineName, provider: ComponentName, box_name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let id = blake3::hash(format!("{name}:{box_name}:{now}").as_bytes())
            .to_hex()
            .to_string()[..12]
            .to_owned();
        Self {
            id,
            name,
            provider,
            box_name,
            state: MachineState::Running,
            hostname: None,
            synced_folders: Vec::new(),
            snapshots: Vec::new(),
            history: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn record(&mut self, commands: impl IntoIterator<Item = String>) {
        self.history.extend(commands);
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MachineIndex {
    version: u32,
    #[serde(default)]
    machines: BTreeMap<MachineName, MachineRecord>,
}

impl Default for MachineIndex {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            machines: BTreeMap::new(),
        }
    }
}

/// Mock provider state, one JSON file for every machine.
///
/// Reads see a complete file because writes go through a temp file and
/// rename. Read-modify-write cycles hold the `machines` named lock so that
/// concurrent pipelines (threads or processes) do not lose updates.
#[derive(Debug)]
pub struct MachineStore {
    dir: PathBuf,
    locks: LockManager,
    policy: RetryPolicy,
}

impl MachineStore {
    pub fn new(data_dir: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        let dir = data_dir.into();
        let locks = LockManager::new(dir.join("locks"));
        Self { dir, locks, policy }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn read(&self) -> Result<MachineIndex, BuiltinError> {
        let path = self.path();
        if !path.exists() {
            return Ok(MachineIndex::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, index: &MachineIndex) -> Result<(), BuiltinError> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(index)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path()).map_err(|e| BuiltinError::Io(e.error))?;
        Ok(())
    }

    fn modify<T>(
        &self,
        f: impl FnOnce(&mut MachineIndex) -> Result<T, BuiltinError>,
    ) -> Result<T, BuiltinError> {
        let _guard = self.locks.lock(STATE_LOCK, self.policy)?;
        let mut index = self.read()?;
        let out = f(&mut index)?;
        self.write(&index)?;
        Ok(out)
    }

    pub fn get(&self, name: &str) -> Result<Option<MachineRecord>, BuiltinError> {
        Ok(self.read()?.machines.remove(name))
    }

    pub fn list(&self) -> Result<Vec<MachineRecord>, BuiltinError> {
        Ok(self.read()?.machines.into_values().collect())
    }

    pub fn insert_new(&self, record: MachineRecord) -> Result<(), BuiltinError> {
        self.modify(|index| {
            if index.machines.contains_key(&record.name) {
                return Err(BuiltinError::AlreadyExists(record.name.to_string()));
            }
            debug!("recording machine '{}' ({})", record.name, record.id);
            index.machines.insert(record.name.clone(), record);
            Ok(())
        })
    }

    /// Apply `f` to an existing record and persist the result.
    pub fn update<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MachineRecord) -> Result<T, BuiltinError>,
    ) -> Result<T, BuiltinError> {
        self.modify(|index| {
            let record = index
                .machines
                .get_mut(name)
                .ok_or_else(|| BuiltinError::NotCreated(name.to_owned()))?;
            let out = f(record)?;
            record.touch();
            Ok(out)
        })
    }

    pub fn remove(&self, name: &str) -> Result<Option<MachineRecord>, BuiltinError> {
        self.modify(|index| Ok(index.machines.remove(name)))
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }
}
