//! Capability names and the signatures builtin plugins agree on.

use crate::state::MachineRecord;

pub const HALT: &str = "halt";
pub const FORCE_HALT: &str = "force_halt";
pub const CHANGE_HOST_NAME: &str = "change_host_name";
pub const MOUNT_SHARED_FOLDER: &str = "mount_shared_folder";
pub const RSYNC_COMMAND: &str = "rsync_command";
pub const SNAPSHOT_SAVE: &str = "snapshot_save";
pub const PACKAGE: &str = "package";
pub const PROVISION_RUN: &str = "run";

/// Guest: commands that power the machine off.
pub type HaltFn = fn() -> Vec<String>;
/// Guest: commands that set the hostname.
pub type ChangeHostNameFn = fn(&str) -> Vec<String>;
/// Guest: commands that mount a provider share `(tag, guest_path)`.
pub type MountSharedFolderFn = fn(&str, &str) -> Vec<String>;
/// Host: command that pushes `host_path` into `guest_path` on a machine.
pub type RsyncCommandFn = fn(&str, &str, &str) -> Vec<String>;
/// Provider: power the machine off without the guest's help.
pub type ForceHaltFn = fn(&MachineRecord) -> Vec<String>;
/// Provider: save a snapshot, returning its identifier.
pub type SnapshotSaveFn = fn(&MachineRecord, &str) -> String;
/// Provider: box metadata written by `package`.
pub type PackageFn = fn(&MachineRecord) -> serde_json::Value;
/// Provisioner: commands for one inline script.
pub type ProvisionRunFn = fn(&str) -> Vec<String>;
