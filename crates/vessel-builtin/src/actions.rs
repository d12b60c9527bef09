//! Lifecycle actions and the steps they are built from.
//!
//! Every step reads the shared [`Environment`] and the target machine name
//! from the context. Step names double as hook anchors:
//!
//! | action   | pipeline                                                              |
//! |----------|-----------------------------------------------------------------------|
//! | up       | ConfigValidate, IsCreated ? Start : (Provision, Create), SyncFolders, SetHostname |
//! | halt     | ConfigValidate, IsCreated ? Halt : MessageNotCreated                  |
//! | destroy  | ConfigValidate, IsCreated ? (ConfirmDestroy, Halt, Destroy) : MessageNotCreated |
//! | status   | Status                                                                |
//! | snapshot | ConfigValidate, IsCreated ? SnapshotSave : RequireCreated             |
//! | package  | ConfigValidate, IsCreated ? (Halt, Package) : RequireCreated          |

use crate::caps::{
    self, ChangeHostNameFn, ForceHaltFn, HaltFn, MountSharedFolderFn, PackageFn, ProvisionRunFn,
    RsyncCommandFn, SnapshotSaveFn,
};
use crate::environment::Environment;
use crate::state::{MachineRecord, MachineState, SyncedFolderRecord};
use crate::BuiltinError;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use vessel_core::{BoxError, Builder, Context, CoreError, Next, Step, StepSpec};
use vessel_plugin::PluginError;
use vessel_schema::{Category, ComponentName, MachineName};

/// `Arc<Environment>` the action runs in.
pub const ENV_KEY: &str = "env";
/// [`MachineName`] the action targets.
pub const MACHINE_KEY: &str = "machine";
/// `bool`: skip the destroy confirmation.
pub const FORCE_CONFIRM_DESTROY_KEY: &str = "force_confirm_destroy";
/// [`ConfirmFn`] asked before destroying a machine.
pub const CONFIRM_DESTROY_KEY: &str = "confirm_destroy";
/// `bool`: whether `destroy` removed the machine.
pub const DESTROY_PERFORMED_KEY: &str = "destroy_performed";
/// [`MachineStatus`] left by `status`.
pub const MACHINE_STATUS_KEY: &str = "machine_status";
/// `String`: name of the snapshot to save.
pub const SNAPSHOT_NAME_KEY: &str = "snapshot_name";
/// `PathBuf`: where `package` writes the box; replaced with the final path.
pub const PACKAGE_OUTPUT_KEY: &str = "package_output";

/// Destroy confirmation callback, given the machine name.
pub type ConfirmFn = Box<dyn Fn(&str) -> bool + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Up,
    Halt,
    Destroy,
    Status,
    Snapshot,
    Package,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Up,
        Action::Halt,
        Action::Destroy,
        Action::Status,
        Action::Snapshot,
        Action::Package,
    ];

    /// Name hooks are looked up under. Hooks may also register for the
    /// short forms (`Up`, `up`).
    pub fn name(self) -> &'static str {
        match self {
            Action::Up => "vessel::builtin::Up",
            Action::Halt => "vessel::builtin::Halt",
            Action::Destroy => "vessel::builtin::Destroy",
            Action::Status => "vessel::builtin::Status",
            Action::Snapshot => "vessel::builtin::Snapshot",
            Action::Package => "vessel::builtin::Package",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Up => "up",
            Action::Halt => "halt",
            Action::Destroy => "destroy",
            Action::Status => "status",
            Action::Snapshot => "snapshot",
            Action::Package => "package",
        }
    }

    pub fn builder(self) -> Builder {
        match self {
            Action::Up => up(),
            Action::Halt => halt(),
            Action::Destroy => destroy(),
            Action::Status => Builder::from_specs([step::<Status>("Status")]),
            Action::Snapshot => snapshot(),
            Action::Package => package(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `status` reports for one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineStatus {
    pub name: MachineName,
    pub provider: ComponentName,
    /// `None` when the machine has not been created.
    pub state: Option<MachineState>,
    pub id: Option<String>,
    pub hostname: Option<String>,
    pub snapshots: Vec<String>,
}

impl MachineStatus {
    pub fn state_label(&self) -> String {
        self.state
            .map_or_else(|| "not_created".to_owned(), |s| s.to_string())
    }
}

fn step<S: Step + Default + 'static>(name: &str) -> StepSpec {
    StepSpec::new(name, |_| S::default())
}

fn is_created(then: Vec<StepSpec>, otherwise: Vec<StepSpec>) -> StepSpec {
    StepSpec::branch(
        "IsCreated",
        |_| IsCreated,
        move |ctx: &Context, b: &mut Builder| -> Result<(), CoreError> {
            let chosen = if ctx.result().unwrap_or(false) {
                &then
            } else {
                &otherwise
            };
            for spec in chosen {
                b.append(spec.clone());
            }
            Ok(())
        },
    )
}

fn up() -> Builder {
    Builder::from_specs([
        step::<ConfigValidate>("ConfigValidate"),
        is_created(
            vec![step::<Start>("Start")],
            vec![step::<Provision>("Provision"), step::<Create>("Create")],
        ),
        step::<SyncFolders>("SyncFolders"),
        step::<SetHostname>("SetHostname"),
    ])
}

fn halt() -> Builder {
    Builder::from_specs([
        step::<ConfigValidate>("ConfigValidate"),
        is_created(
            vec![step::<Halt>("Halt")],
            vec![step::<MessageNotCreated>("MessageNotCreated")],
        ),
    ])
}

fn destroy() -> Builder {
    Builder::from_specs([
        step::<ConfigValidate>("ConfigValidate"),
        is_created(
            vec![
                step::<ConfirmDestroy>("ConfirmDestroy"),
                step::<Halt>("Halt"),
                step::<Destroy>("Destroy"),
            ],
            vec![step::<MessageNotCreated>("MessageNotCreated")],
        ),
    ])
}

fn snapshot() -> Builder {
    Builder::from_specs([
        step::<ConfigValidate>("ConfigValidate"),
        is_created(
            vec![step::<SnapshotSave>("SnapshotSave")],
            vec![step::<RequireCreated>("RequireCreated")],
        ),
    ])
}

fn package() -> Builder {
    Builder::from_specs([
        step::<ConfigValidate>("ConfigValidate"),
        is_created(
            vec![step::<Halt>("Halt"), step::<Package>("Package")],
            vec![step::<RequireCreated>("RequireCreated")],
        ),
    ])
}

fn env(ctx: &Context) -> Result<Arc<Environment>, BuiltinError> {
    ctx.get::<Arc<Environment>>(ENV_KEY)
        .cloned()
        .ok_or(BuiltinError::MissingContext(ENV_KEY))
}

fn machine(ctx: &Context) -> Result<MachineName, BuiltinError> {
    ctx.get::<MachineName>(MACHINE_KEY)
        .cloned()
        .ok_or(BuiltinError::MissingContext(MACHINE_KEY))
}

fn require_record(env: &Environment, machine: &str) -> Result<MachineRecord, BuiltinError> {
    env.store()
        .get(machine)?
        .ok_or_else(|| BuiltinError::NotCreated(machine.to_owned()))
}

/// Checks the machine is configured and its provider is usable here.
#[derive(Default)]
struct ConfigValidate;

impl Step for ConfigValidate {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        let section = env.machine(&machine)?;
        let probe = env.probe_for(&machine)?;
        let provider = env.registry().lookup(Category::Provider, &section.provider)?;
        if !provider.instance().usable(&probe) {
            return Err(BuiltinError::ProviderUnusable(section.provider.to_string()).into());
        }
        next.call(ctx)
    }
}

/// Branch decision: leaves whether the machine exists as the result.
struct IsCreated;

impl Step for IsCreated {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        let created = env.store().get(&machine)?.is_some();
        debug!("machine '{machine}' created: {created}");
        ctx.set_result(created);
        next.call(ctx)
    }
}

#[derive(Default)]
struct Start;

impl Step for Start {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        env.store().update(&machine, |record| {
            if record.state == MachineState::Running {
                info!("machine '{machine}' is already running");
            } else {
                info!("booting machine '{machine}'");
                record.state = MachineState::Running;
                record.record(["boot".to_owned()]);
            }
            Ok(())
        })?;
        next.call(ctx)
    }
}

/// Imports the box and records the new machine. Undo deletes the record.
#[derive(Default)]
struct Create {
    created: Cell<bool>,
}

impl Step for Create {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        let section = env.machine(&machine)?;
        let mut record = MachineRecord::new(
            machine.clone(),
            section.provider.clone(),
            section.box_name.clone(),
        );
        record.record([format!("import {}", section.box_name), "boot".to_owned()]);
        info!("creating machine '{machine}' from box '{}'", section.box_name);
        env.store().insert_new(record)?;
        self.created.set(true);
        next.call(ctx)
    }

    fn undo(&self, ctx: &mut Context) -> Result<(), BoxError> {
        if !self.created.replace(false) {
            return Ok(());
        }
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        warn!("removing partially created machine '{machine}'");
        env.store().remove(&machine)?;
        Ok(())
    }
}

/// Runs the machine's inline provisioning scripts once the rest of the
/// pipeline has brought it up.
#[derive(Default)]
struct Provision;

impl Step for Provision {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        next.call(ctx)?;

        let env = env(ctx)?;
        let machine = machine(ctx)?;
        let scripts = &env.machine(&machine)?.provision;
        if scripts.is_empty() {
            return Ok(());
        }
        let run = env.registry().resolve_capability_as::<ProvisionRunFn>(
            Category::Provisioner,
            "shell",
            caps::PROVISION_RUN,
        )?;
        let commands: Vec<String> = scripts.iter().flat_map(|s| (*run)(s.as_str())).collect();
        info!("provisioning '{machine}' with {} script(s)", scripts.len());
        env.store().update(&machine, |record| {
            record.record(commands);
            Ok(())
        })?;
        Ok(())
    }
}

/// Shares the configured folders using the best usable implementation.
#[derive(Default)]
struct SyncFolders {
    synced: Cell<bool>,
}

impl SyncFolders {
    fn commands(
        env: &Environment,
        machine: &str,
        implementation: &str,
        index: usize,
        host_path: &str,
        guest_path: &str,
    ) -> Result<Vec<String>, BuiltinError> {
        if implementation == "rsync" {
            let rsync = env.host()?.get_as::<RsyncCommandFn>(caps::RSYNC_COMMAND)?;
            return Ok((*rsync)(machine, host_path, guest_path));
        }
        let mount = env
            .guest(machine)?
            .get_as::<MountSharedFolderFn>(caps::MOUNT_SHARED_FOLDER)?;
        Ok((*mount)(&format!("{implementation}_{index}"), guest_path))
    }
}

impl Step for SyncFolders {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        let pairs = env.machine(&machine)?.synced_folder_pairs();
        if pairs.is_empty() {
            return next.call(ctx);
        }

        let probe = env.probe_for(&machine)?;
        let implementation = env
            .registry()
            .best_usable(Category::SyncedFolder, &probe)
            .ok_or_else(|| BuiltinError::NoUsableSyncedFolder(machine.to_string()))?;

        let mut folders = Vec::with_capacity(pairs.len());
        let mut commands = Vec::new();
        for (index, (host_path, guest_path)) in pairs.into_iter().enumerate() {
            commands.extend(Self::commands(
                &env,
                &machine,
                &implementation,
                index,
                &host_path,
                &guest_path,
            )?);
            folders.push(SyncedFolderRecord {
                host_path,
                guest_path,
                implementation: implementation.clone(),
            });
        }
        info!(
            "syncing {} folder(s) into '{machine}' with '{implementation}'",
            folders.len()
        );
        env.store().update(&machine, |record| {
            record.synced_folders = folders;
            record.record(commands);
            Ok(())
        })?;
        self.synced.set(true);
        next.call(ctx)
    }

    fn undo(&self, ctx: &mut Context) -> Result<(), BoxError> {
        if !self.synced.replace(false) {
            return Ok(());
        }
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        match env.store().update(&machine, |record| {
            record.synced_folders.clear();
            Ok(())
        }) {
            Ok(()) | Err(BuiltinError::NotCreated(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Sets the configured hostname through the guest's capability. Undo puts
/// the previous name back in the record.
#[derive(Default)]
struct SetHostname {
    changed: Cell<bool>,
    previous: RefCell<Option<String>>,
}

impl Step for SetHostname {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        if let Some(hostname) = env.machine(&machine)?.hostname.clone() {
            let guest = env.guest(&machine)?;
            let change = guest.get_as::<ChangeHostNameFn>(caps::CHANGE_HOST_NAME)?;
            let commands = (*change)(&hostname);
            debug!("setting hostname of '{machine}' via guest '{}'", guest.name());
            let previous = env.store().update(&machine, |record| {
                record.record(commands);
                Ok(record.hostname.replace(hostname))
            })?;
            self.changed.set(true);
            self.previous.replace(previous);
        }
        next.call(ctx)
    }

    fn undo(&self, ctx: &mut Context) -> Result<(), BoxError> {
        if !self.changed.replace(false) {
            return Ok(());
        }
        let previous = self.previous.take();
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        match env.store().update(&machine, |record| {
            record.hostname = previous;
            Ok(())
        }) {
            Ok(()) | Err(BuiltinError::NotCreated(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Powers the machine off through the guest, or through the provider when
/// the guest cannot be determined or has no halt capability.
#[derive(Default)]
struct Halt;

impl Halt {
    fn graceful(env: &Environment, machine: &str) -> Result<Option<Vec<String>>, BuiltinError> {
        let guest = match env.guest(machine) {
            Ok(guest) => guest,
            Err(BuiltinError::Plugin(e @ PluginError::DetectionFailed { .. })) => {
                debug!("no guest for '{machine}': {e}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        match guest.get_as::<HaltFn>(caps::HALT) {
            Ok(halt) => Ok(Some((*halt)())),
            Err(e @ PluginError::CapabilityNotSupported { .. }) => {
                debug!("{e}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn commands(env: &Environment, record: &MachineRecord) -> Result<Vec<String>, BuiltinError> {
        if let Some(commands) = Self::graceful(env, &record.name)? {
            return Ok(commands);
        }
        warn!("forcing '{}' off through provider '{}'", record.name, record.provider);
        let force = env.registry().resolve_capability_as::<ForceHaltFn>(
            Category::Provider,
            &record.provider,
            caps::FORCE_HALT,
        )?;
        Ok((*force)(record))
    }
}

impl Step for Halt {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        let record = require_record(&env, &machine)?;
        if record.state == MachineState::Running {
            let commands = Self::commands(&env, &record)?;
            info!("halting machine '{machine}'");
            env.store().update(&machine, |record| {
                record.state = MachineState::Poweroff;
                record.record(commands);
                Ok(())
            })?;
        } else {
            debug!("machine '{machine}' is already {}", record.state);
        }
        next.call(ctx)
    }
}

/// Stops the pipeline unless destruction is forced or confirmed.
#[derive(Default)]
struct ConfirmDestroy;

impl Step for ConfirmDestroy {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let machine = machine(ctx)?;
        let confirmed = ctx.flag(FORCE_CONFIRM_DESTROY_KEY)
            || ctx
                .get::<ConfirmFn>(CONFIRM_DESTROY_KEY)
                .is_some_and(|confirm| confirm(machine.as_str()));
        if !confirmed {
            info!("not destroying '{machine}': not confirmed");
            ctx.insert(DESTROY_PERFORMED_KEY, false);
            return Ok(());
        }
        next.call(ctx)
    }
}

#[derive(Default)]
struct Destroy;

impl Step for Destroy {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        env.store().remove(&machine)?;
        info!("destroyed machine '{machine}'");
        ctx.insert(DESTROY_PERFORMED_KEY, true);
        next.call(ctx)
    }
}

#[derive(Default)]
struct Status;

impl Step for Status {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        let section = env.machine(&machine)?;
        let record = env.store().get(&machine)?;
        let status = MachineStatus {
            name: machine.clone(),
            provider: section.provider.clone(),
            state: record.as_ref().map(|r| r.state),
            id: record.as_ref().map(|r| r.id.clone()),
            hostname: record.as_ref().and_then(|r| r.hostname.clone()),
            snapshots: record.map(|r| r.snapshots).unwrap_or_default(),
        };
        ctx.insert(MACHINE_STATUS_KEY, status);
        next.call(ctx)
    }
}

#[derive(Default)]
struct MessageNotCreated;

impl Step for MessageNotCreated {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let machine = machine(ctx)?;
        info!("machine '{machine}' is not created");
        next.call(ctx)
    }
}

#[derive(Default)]
struct RequireCreated;

impl Step for RequireCreated {
    fn call(&self, ctx: &mut Context, _next: &mut Next<'_>) -> Result<(), BoxError> {
        Err(BuiltinError::NotCreated(machine(ctx)?.to_string()).into())
    }
}

/// Saves a named snapshot through the provider. Undo forgets it again.
#[derive(Default)]
struct SnapshotSave {
    saved: RefCell<Option<String>>,
}

impl Step for SnapshotSave {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        let name = ctx
            .get::<String>(SNAPSHOT_NAME_KEY)
            .cloned()
            .ok_or(BuiltinError::MissingContext(SNAPSHOT_NAME_KEY))?;
        let provider = env.machine(&machine)?.provider.clone();
        let save = env.registry().resolve_capability_as::<SnapshotSaveFn>(
            Category::Provider,
            &provider,
            caps::SNAPSHOT_SAVE,
        )?;

        env.store().update(&machine, |record| {
            if record.snapshots.contains(&name) {
                return Err(BuiltinError::SnapshotExists {
                    machine: machine.to_string(),
                    snapshot: name.clone(),
                });
            }
            let id = (*save)(record, &name);
            info!("saved snapshot '{name}' of '{machine}' as {id}");
            record.snapshots.push(name.clone());
            record.record([format!("snapshot save {name} {id}")]);
            Ok(())
        })?;
        self.saved.replace(Some(name));
        next.call(ctx)
    }

    fn undo(&self, ctx: &mut Context) -> Result<(), BoxError> {
        let Some(name) = self.saved.take() else {
            return Ok(());
        };
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        env.store().update(&machine, |record| {
            record.snapshots.retain(|s| *s != name);
            Ok(())
        })?;
        Ok(())
    }
}

#[derive(Serialize)]
struct BoxFile {
    metadata: serde_json::Value,
    checksum: String,
}

/// Writes the machine out as a box file. Undo deletes the file.
#[derive(Default)]
struct Package {
    written: RefCell<Option<PathBuf>>,
}

impl Step for Package {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        let env = env(ctx)?;
        let machine = machine(ctx)?;
        let record = require_record(&env, &machine)?;
        let build = env.registry().resolve_capability_as::<PackageFn>(
            Category::Provider,
            &record.provider,
            caps::PACKAGE,
        )?;

        let metadata = (*build)(&record);
        let checksum = blake3::hash(serde_json::to_string(&metadata)?.as_bytes())
            .to_hex()
            .to_string();
        let content = serde_json::to_string_pretty(&BoxFile { metadata, checksum })?;

        let output = ctx
            .get::<PathBuf>(PACKAGE_OUTPUT_KEY)
            .cloned()
            .unwrap_or_else(|| env.store().data_dir().join(format!("{machine}.box")));
        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&output).map_err(|e| BuiltinError::Io(e.error))?;
        info!("packaged '{machine}' into {}", output.display());

        self.written.replace(Some(output.clone()));
        ctx.insert(PACKAGE_OUTPUT_KEY, output);
        next.call(ctx)
    }

    fn undo(&self, _ctx: &mut Context) -> Result<(), BoxError> {
        if let Some(path) = self.written.take() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}
