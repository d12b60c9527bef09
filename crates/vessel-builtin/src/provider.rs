use crate::caps::{self, ForceHaltFn, PackageFn, ProvisionRunFn, SnapshotSaveFn};
use crate::state::MachineRecord;
use vessel_plugin::{Component, ComponentSpec, PluginSpec};
use vessel_schema::Category;

/// Provider backed only by the machine state file.
struct MockProvider;

impl Component for MockProvider {}

fn force_halt(record: &MachineRecord) -> Vec<String> {
    vec![format!("poweroff --force {}", record.id)]
}

fn snapshot_save(record: &MachineRecord, name: &str) -> String {
    blake3::hash(format!("{}:{name}:{}", record.id, record.updated_at).as_bytes())
        .to_hex()
        .to_string()[..12]
        .to_owned()
}

fn package(record: &MachineRecord) -> serde_json::Value {
    serde_json::json!({
        "format_version": 1,
        "provider": record.provider,
        "source_box": record.box_name,
        "machine_id": record.id,
        "hostname": record.hostname,
        "snapshots": record.snapshots,
    })
}

pub fn plugin() -> PluginSpec {
    PluginSpec::new("provider_mock")
        .component(ComponentSpec::new(Category::Provider, "mock", || MockProvider))
        .capability(Category::Provider, "mock", caps::FORCE_HALT, force_halt as ForceHaltFn)
        .capability(Category::Provider, "mock", caps::SNAPSHOT_SAVE, snapshot_save as SnapshotSaveFn)
        .capability(Category::Provider, "mock", caps::PACKAGE, package as PackageFn)
}

struct ShellProvisioner;

impl Component for ShellProvisioner {}

fn shell_run(script: &str) -> Vec<String> {
    vec![format!("sh -c '{}'", script.replace('\'', "'\\''"))]
}

pub fn shell_provisioner() -> PluginSpec {
    PluginSpec::new("provisioner_shell")
        .component(ComponentSpec::new(Category::Provisioner, "shell", || ShellProvisioner))
        .capability(Category::Provisioner, "shell", caps::PROVISION_RUN, shell_run as ProvisionRunFn)
}
