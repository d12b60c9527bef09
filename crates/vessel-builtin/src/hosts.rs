use crate::caps::{self, RsyncCommandFn};
use vessel_plugin::{Component, ComponentSpec, FactProbe, PluginSpec, Probe};
use vessel_schema::Category;

struct PlatformHost(&'static [&'static str]);

impl Component for PlatformHost {
    fn detect(&self, probe: &dyn Probe) -> bool {
        probe
            .fact("platform")
            .is_some_and(|p| self.0.contains(&p.to_ascii_lowercase().as_str()))
    }
}

fn host(name: &'static str, platforms: &'static [&'static str]) -> ComponentSpec {
    ComponentSpec::new(Category::Host, name, move || PlatformHost(platforms))
}

fn rsync(machine: &str, host_path: &str, guest_path: &str) -> Vec<String> {
    vec![format!(
        "rsync --archive --delete --compress {}/ {machine}:{guest_path}",
        host_path.trim_end_matches('/')
    )]
}

pub fn plugin() -> PluginSpec {
    PluginSpec::new("hosts")
        .component(host("linux", &["linux"]))
        .component(host("darwin", &["darwin", "macos"]))
        .component(host("windows", &["windows"]))
        .capability(Category::Host, "linux", caps::RSYNC_COMMAND, rsync as RsyncCommandFn)
        .capability(Category::Host, "darwin", caps::RSYNC_COMMAND, rsync as RsyncCommandFn)
}

/// Facts describing the machine this process runs on.
pub fn local_probe() -> FactProbe {
    FactProbe::new()
        .with_fact("platform", std::env::consts::OS)
        .with_fact("arch", std::env::consts::ARCH)
}
