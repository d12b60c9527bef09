use std::sync::{Arc, Barrier};
use std::thread;
use vessel_plugin::{Component, ComponentSpec, FactProbe, PluginError, Probe, Registry};
use vessel_schema::{Category, ComponentName, TieBreak};

struct Plain;
impl Component for Plain {}

/// Matches when the probe's `os_id` is any of the given ids.
struct Matches(&'static [&'static str]);
impl Component for Matches {
    fn detect(&self, probe: &dyn Probe) -> bool {
        probe
            .fact("os_id")
            .is_some_and(|id| self.0.contains(&id.as_str()))
    }
}

struct UsableWhen(&'static str);
impl Component for UsableWhen {
    fn usable(&self, probe: &dyn Probe) -> bool {
        probe.test(self.0)
    }
}

fn guest(name: &str) -> ComponentSpec {
    ComponentSpec::new(Category::Guest, name, || Plain)
}

type HaltCmd = fn() -> &'static str;

fn parent_halt() -> &'static str {
    "parent"
}

fn child_halt() -> &'static str {
    "child"
}

#[test]
fn capability_falls_back_to_parent() {
    let mut reg = Registry::new();
    reg.register(guest("parent"));
    reg.register(guest("child").with_parent("parent"));
    reg.register_capability(Category::Guest, "parent", "x", parent_halt as HaltCmd);

    let imp = reg
        .resolve_capability_as::<HaltCmd>(Category::Guest, "child", "x")
        .unwrap();
    assert_eq!(imp(), "parent");
}

#[test]
fn child_capability_wins_over_parent() {
    let mut reg = Registry::new();
    reg.register(guest("parent"));
    reg.register(guest("child").with_parent("parent"));
    reg.register_capability(Category::Guest, "parent", "x", parent_halt as HaltCmd);
    reg.register_capability(Category::Guest, "child", "x", child_halt as HaltCmd);

    let resolved = reg.resolve_capability(Category::Guest, "child", "x").unwrap();
    assert_eq!(resolved.owner, "child");
    assert_eq!((resolved.downcast::<HaltCmd>().unwrap())(), "child");
}

#[test]
fn missing_capability_is_not_supported() {
    let mut reg = Registry::new();
    reg.register(guest("parent"));
    reg.register(guest("child").with_parent("parent"));
    assert!(!reg.supports_capability(Category::Guest, "child", "x").unwrap());
    let err = reg
        .resolve_capability(Category::Guest, "child", "x")
        .unwrap_err();
    assert!(matches!(err, PluginError::CapabilityNotSupported { .. }));
}

#[test]
fn first_declared_parent_branch_is_searched_first() {
    let mut reg = Registry::new();
    reg.register(guest("root_a"));
    reg.register(guest("a").with_parent("root_a"));
    reg.register(guest("b"));
    reg.register(guest("child").with_parents(["a", "b"]));
    reg.register_capability(Category::Guest, "root_a", "x", "from_root_a");
    reg.register_capability(Category::Guest, "b", "x", "from_b");

    let resolved = reg.resolve_capability(Category::Guest, "child", "x").unwrap();
    assert_eq!(resolved.owner, "root_a");
}

#[test]
fn cycles_fail_resolution_and_detection() {
    let mut reg = Registry::new();
    reg.register(ComponentSpec::new(Category::Guest, "a", || Matches(&["a"])).with_parent("b"));
    reg.register(ComponentSpec::new(Category::Guest, "b", || Matches(&["b"])).with_parent("a"));

    for name in ["a", "b"] {
        let err = reg
            .resolve_capability(Category::Guest, name, "x")
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidComponentGraph { .. }));
    }
    let err = reg
        .detect(Category::Guest, &FactProbe::new().with_fact("os_id", "a"))
        .unwrap_err();
    assert!(matches!(err, PluginError::InvalidComponentGraph { .. }));
    assert!(reg.validate().is_err());
}

#[test]
fn diamond_is_not_a_cycle() {
    let mut reg = Registry::new();
    reg.register(guest("base"));
    reg.register(guest("left").with_parent("base"));
    reg.register(guest("right").with_parent("base"));
    reg.register(guest("top").with_parents(["left", "right"]));
    reg.register_capability(Category::Guest, "right", "x", 1_u8);
    reg.validate().unwrap();
    assert_eq!(
        reg.resolve_capability(Category::Guest, "top", "x")
            .unwrap()
            .owner,
        "right"
    );
}

#[test]
fn ambiguous_detection_names_both() {
    let mut reg = Registry::new();
    reg.register(ComponentSpec::new(Category::Guest, "linux", || Matches(&["x"])));
    reg.register(
        ComponentSpec::new(Category::Guest, "arch", || Matches(&["x"])).with_parent("linux"),
    );
    reg.register(
        ComponentSpec::new(Category::Guest, "gentoo", || Matches(&["x"])).with_parent("linux"),
    );

    let err = reg
        .detect(Category::Guest, &FactProbe::new().with_fact("os_id", "x"))
        .unwrap_err();
    match err {
        PluginError::AmbiguousDetection { candidates, .. } => {
            assert_eq!(candidates, vec!["arch", "gentoo"]);
        }
        other => panic!("expected ambiguity, got {other}"),
    }
}

#[test]
fn most_specific_match_wins() {
    let mut reg = Registry::new();
    reg.register(ComponentSpec::new(Category::Guest, "linux", || {
        Matches(&["ubuntu", "debian"])
    }));
    reg.register(
        ComponentSpec::new(Category::Guest, "debian", || Matches(&["ubuntu", "debian"]))
            .with_parent("linux"),
    );
    reg.register(
        ComponentSpec::new(Category::Guest, "ubuntu", || Matches(&["ubuntu"])).with_parent("debian"),
    );

    let probe = FactProbe::new().with_fact("os_id", "ubuntu");
    assert_eq!(reg.detect(Category::Guest, &probe).unwrap(), "ubuntu");
    let probe = FactProbe::new().with_fact("os_id", "debian");
    assert_eq!(reg.detect(Category::Guest, &probe).unwrap(), "debian");
    let probe = FactProbe::new().with_fact("os_id", "beos");
    assert!(matches!(
        reg.detect(Category::Guest, &probe),
        Err(PluginError::DetectionFailed { .. })
    ));
}

#[test]
fn best_usable_ranks_by_priority_then_tie_break() {
    fn folders(tie_break: TieBreak) -> Registry {
        let mut reg = Registry::with_tie_break(tie_break);
        reg.register(
            ComponentSpec::new(Category::SyncedFolder, "rsync", || UsableWhen("rsync")).with_priority(5),
        );
        reg.register(ComponentSpec::new(Category::SyncedFolder, "nfs", || UsableWhen("nfs")));
        reg.register(ComponentSpec::new(Category::SyncedFolder, "smb", || UsableWhen("smb")));
        reg
    }

    let all = FactProbe::new()
        .with_passing("rsync")
        .with_passing("nfs")
        .with_passing("smb");
    assert_eq!(
        folders(TieBreak::FirstRegistered)
            .best_usable(Category::SyncedFolder, &all)
            .as_deref(),
        Some("nfs")
    );
    assert_eq!(
        folders(TieBreak::LastRegistered)
            .best_usable(Category::SyncedFolder, &all)
            .as_deref(),
        Some("smb")
    );

    let only_rsync = FactProbe::new().with_passing("rsync");
    assert_eq!(
        folders(TieBreak::FirstRegistered)
            .best_usable(Category::SyncedFolder, &only_rsync)
            .as_deref(),
        Some("rsync")
    );
    assert!(folders(TieBreak::FirstRegistered)
        .best_usable(Category::SyncedFolder, &FactProbe::new())
        .is_none());
}

#[test]
fn snapshot_answers_match_registry() {
    let mut reg = Registry::new();
    reg.register(ComponentSpec::new(Category::Host, "bsd", || Matches(&["darwin", "freebsd"])));
    reg.register(
        ComponentSpec::new(Category::Host, "darwin", || Matches(&["darwin"])).with_parent("bsd"),
    );
    reg.register(
        ComponentSpec::new(Category::Host, "freebsd", || Matches(&["freebsd"])).with_parent("bsd"),
    );
    reg.register_capability(Category::Host, "bsd", "nfs_export", "exportfs");
    reg.register_capability(Category::Host, "darwin", "provider_install", "brew");

    let snap = reg.snapshot();
    let snap = vessel_plugin::RegistrySnapshot::from_json(&snap.to_json().unwrap()).unwrap();

    for name in ["bsd", "darwin", "freebsd"] {
        assert_eq!(
            snap.parents(Category::Host, name).unwrap(),
            reg.parents_of(Category::Host, name).unwrap()
        );
        for cap in ["nfs_export", "provider_install", "missing"] {
            assert_eq!(
                snap.has_capability(Category::Host, name, cap).unwrap(),
                reg.supports_capability(Category::Host, name, cap).unwrap()
            );
        }
    }

    let probe = FactProbe::new().with_fact("os_id", "darwin");
    let matched: Vec<ComponentName> = reg
        .components(Category::Host)
        .into_iter()
        .filter(|e| e.instance().detect(&probe))
        .map(|e| e.name().clone())
        .collect();
    assert_eq!(
        snap.pick_detected(Category::Host, &matched).unwrap(),
        reg.detect(Category::Host, &probe).unwrap()
    );
}

#[test]
fn concurrent_lookups_agree() {
    let mut reg = Registry::new();
    reg.register(guest("linux"));
    reg.register(guest("debian").with_parent("linux"));
    reg.register(guest("ubuntu").with_parent("debian"));
    reg.register_capability(Category::Guest, "linux", "halt", "shutdown");
    reg.register_capability(Category::Guest, "debian", "change_host_name", "hostnamectl");
    let reg = Arc::new(reg);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let reg = Arc::clone(&reg);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut owners = Vec::new();
                for _ in 0..100 {
                    owners.push(
                        reg.resolve_capability(Category::Guest, "ubuntu", "halt")
                            .unwrap()
                            .owner,
                    );
                    owners.push(
                        reg.resolve_capability(Category::Guest, "ubuntu", "change_host_name")
                            .unwrap()
                            .owner,
                    );
                }
                owners
            })
        })
        .collect();

    for handle in handles {
        let owners = handle.join().unwrap();
        assert!(owners
            .chunks(2)
            .all(|pair| pair[0] == "linux" && pair[1] == "debian"));
    }
}
