use crate::actions::{self, Action};
use crate::state::MachineStore;
use crate::{hosts, plugins, BuiltinError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use vessel_core::{run_batch, shutdown_requested, BoxError, Context, HookSet, RetryPolicy, Runner};
use vessel_plugin::{CapabilityHost, FactProbe, PluginSpec, Registry};
use vessel_schema::{Category, ConfigV1, MachineName, MachineSection};

/// Name of the machine used when the config declares none.
pub const DEFAULT_MACHINE: &str = "default";

/// Everything one invocation operates on: the parsed config, the populated
/// registry, machine state, and the runner that executes actions.
///
/// Shared between pipelines as `Arc<Environment>`; every action run gets
/// its own [`Context`] with the environment under [`actions::ENV_KEY`].
pub struct Environment {
    config: ConfigV1,
    registry: Registry,
    store: MachineStore,
    runner: Runner,
    machines: BTreeMap<MachineName, MachineSection>,
}

impl Environment {
    /// Environment with the builtin plugins only and no hooks.
    pub fn new(config: ConfigV1, data_dir: impl Into<PathBuf>) -> Result<Self, BuiltinError> {
        Self::with_extensions(config, data_dir, Vec::new(), HookSet::new())
    }

    /// Environment with extra plugins (registered after the builtins, so
    /// they may override them) and action hooks.
    pub fn with_extensions(
        config: ConfigV1,
        data_dir: impl Into<PathBuf>,
        extra: Vec<PluginSpec>,
        hooks: HookSet,
    ) -> Result<Self, BuiltinError> {
        config.validate()?;

        let mut registry = Registry::with_tie_break(config.registry.tie_break);
        for plugin in plugins().into_iter().chain(extra) {
            registry.register_plugin(plugin);
        }
        registry.validate()?;
        if let Some(guest) = &config.detection.guest {
            registry.lookup(Category::Guest, guest)?;
        }
        if let Some(host) = &config.detection.host {
            registry.lookup(Category::Host, host)?;
        }

        let mut machines = config.machines.clone();
        if machines.is_empty() {
            machines.insert(MachineName::new(DEFAULT_MACHINE), MachineSection::default());
        }

        let store = MachineStore::new(data_dir, RetryPolicy::from(&config.locks));
        let runner = Runner::new(hooks).with_interrupt_poll(shutdown_requested);
        info!(
            "environment ready: {} machine(s), state in {}",
            machines.len(),
            store.data_dir().display()
        );

        Ok(Self {
            config,
            registry,
            store,
            runner,
            machines,
        })
    }

    pub fn config(&self) -> &ConfigV1 {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &MachineStore {
        &self.store
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn machine_names(&self) -> Vec<MachineName> {
        self.machines.keys().cloned().collect()
    }

    pub fn machine(&self, name: &str) -> Result<&MachineSection, BuiltinError> {
        self.machines
            .get(name)
            .ok_or_else(|| BuiltinError::UnknownMachine(name.to_owned()))
    }

    /// Facts about a machine: its configured facts plus `provider` and
    /// `machine`.
    pub fn probe_for(&self, name: &str) -> Result<FactProbe, BuiltinError> {
        let section = self.machine(name)?;
        let mut probe: FactProbe = section
            .facts
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        probe.set_fact("provider", section.provider.as_str());
        probe.set_fact("machine", name);
        Ok(probe)
    }

    /// The machine's guest: the per-machine override, then the global
    /// override, then detection.
    pub fn guest(&self, name: &str) -> Result<CapabilityHost<'_>, BuiltinError> {
        let section = self.machine(name)?;
        let probe = self.probe_for(name)?;
        let explicit = section
            .guest
            .as_deref()
            .or(self.config.detection.guest.as_deref());
        Ok(self
            .registry
            .capability_host(Category::Guest, explicit, &probe)?)
    }

    /// The host this process runs on.
    pub fn host(&self) -> Result<CapabilityHost<'_>, BuiltinError> {
        let probe = hosts::local_probe();
        Ok(self.registry.capability_host(
            Category::Host,
            self.config.detection.host.as_deref(),
            &probe,
        )?)
    }

    /// Run one action against one machine. `ctx` may carry extra inputs
    /// (e.g. a destroy confirmation); the context is handed back on success
    /// so callers can read what the pipeline left in it.
    pub fn run(
        self: &Arc<Self>,
        action: Action,
        machine: &str,
        mut ctx: Context,
    ) -> Result<Context, BoxError> {
        self.machine(machine)?;
        ctx.insert(actions::ENV_KEY, Arc::clone(self));
        ctx.insert(actions::MACHINE_KEY, MachineName::new(machine));
        debug!("running {action} on '{machine}'");
        self.runner.run(action.name(), &action.builder(), &mut ctx)?;
        Ok(ctx)
    }

    /// Run `action` on several machines, at most `max_parallel` at a time,
    /// each with its own context from `seed`. Outcomes come back in the
    /// order of `machines`.
    pub fn run_all<F>(
        self: &Arc<Self>,
        action: Action,
        machines: &[MachineName],
        max_parallel: usize,
        seed: F,
    ) -> Vec<(MachineName, Result<Context, BoxError>)>
    where
        F: Fn(&MachineName) -> Context + Sync,
    {
        run_batch(machines.to_vec(), max_parallel, |name| {
            let outcome = self.run(action, &name, seed(&name));
            (name, outcome)
        })
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("machines", &self.machines.keys().collect::<Vec<_>>())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
