use vessel_plugin::{Component, ComponentSpec, PluginSpec, Probe};
use vessel_schema::Category;

/// Provider-native share; only the mock provider offers one.
struct MockShare;

impl Component for MockShare {
    fn usable(&self, probe: &dyn Probe) -> bool {
        probe.fact("provider").as_deref() == Some("mock")
    }
}

struct Rsync;

impl Component for Rsync {}

pub fn plugin() -> PluginSpec {
    PluginSpec::new("synced_folders")
        .component(ComponentSpec::new(Category::SyncedFolder, "mock_share", || MockShare))
        .component(ComponentSpec::new(Category::SyncedFolder, "rsync", || Rsync).with_priority(5))
}
