use crate::caps::{self, ChangeHostNameFn, HaltFn, MountSharedFolderFn};
use vessel_plugin::{Component, ComponentSpec, PluginSpec, Probe};
use vessel_schema::Category;

/// Guest family matched on `/etc/os-release`-style facts.
struct OsGuest {
    kernel: Option<&'static str>,
    ids: &'static [&'static str],
    like: &'static [&'static str],
}

impl Component for OsGuest {
    fn detect(&self, probe: &dyn Probe) -> bool {
        let kernel_matches = self.kernel.is_some_and(|k| {
            probe
                .fact("kernel")
                .is_some_and(|v| v.eq_ignore_ascii_case(k))
        });
        let id_matches = probe
            .fact("os_id")
            .is_some_and(|id| self.ids.contains(&id.to_ascii_lowercase().as_str()));
        let like_matches = probe.fact("os_like").is_some_and(|like| {
            like.split_whitespace()
                .any(|l| self.like.contains(&l.to_ascii_lowercase().as_str()))
        });
        kernel_matches || id_matches || like_matches
    }
}

fn guest(
    name: &'static str,
    kernel: Option<&'static str>,
    ids: &'static [&'static str],
    like: &'static [&'static str],
) -> ComponentSpec {
    ComponentSpec::new(Category::Guest, name, move || OsGuest { kernel, ids, like })
}

fn posix_halt() -> Vec<String> {
    vec!["shutdown -h now".to_owned()]
}

fn posix_hostname(name: &str) -> Vec<String> {
    vec![
        format!("hostname {name}"),
        format!("echo '{name}' > /etc/hostname"),
    ]
}

fn posix_mount(tag: &str, guest_path: &str) -> Vec<String> {
    vec![
        format!("mkdir -p {guest_path}"),
        format!("mount -t vessel_share {tag} {guest_path}"),
    ]
}

fn debian_hostname(name: &str) -> Vec<String> {
    vec![
        format!("hostnamectl set-hostname {name}"),
        format!("sed -i 's/^127.0.1.1.*/127.0.1.1\\t{name}/' /etc/hosts"),
    ]
}

fn redhat_hostname(name: &str) -> Vec<String> {
    vec![
        format!("hostnamectl set-hostname --static {name}"),
        "systemctl restart NetworkManager".to_owned(),
    ]
}

fn windows_halt() -> Vec<String> {
    vec!["shutdown /s /t 1 /c \"Vessel halt\" /f /d p:4:1".to_owned()]
}

fn windows_hostname(name: &str) -> Vec<String> {
    vec![format!("Rename-Computer -NewName {name} -Force -Restart")]
}

fn windows_mount(tag: &str, guest_path: &str) -> Vec<String> {
    vec![format!("net use {guest_path} \\\\vessel\\{tag}")]
}

/// linux <- debian <- ubuntu, linux <- redhat <- fedora, and windows.
pub fn plugin() -> PluginSpec {
    let g = Category::Guest;
    PluginSpec::new("guests")
        .component(guest("linux", Some("linux"), &[], &[]))
        .component(guest("debian", None, &["debian"], &["debian"]).with_parent("linux"))
        .component(guest("ubuntu", None, &["ubuntu"], &["ubuntu"]).with_parent("debian"))
        .component(
            guest("redhat", None, &["rhel", "centos", "rocky", "almalinux"], &["rhel"])
                .with_parent("linux"),
        )
        .component(guest("fedora", None, &["fedora"], &[]).with_parent("redhat"))
        .component(guest("windows", Some("windows"), &["windows"], &[]))
        .capability(g, "linux", caps::HALT, posix_halt as HaltFn)
        .capability(g, "linux", caps::CHANGE_HOST_NAME, posix_hostname as ChangeHostNameFn)
        .capability(g, "linux", caps::MOUNT_SHARED_FOLDER, posix_mount as MountSharedFolderFn)
        .capability(g, "debian", caps::CHANGE_HOST_NAME, debian_hostname as ChangeHostNameFn)
        .capability(g, "redhat", caps::CHANGE_HOST_NAME, redhat_hostname as ChangeHostNameFn)
        .capability(g, "windows", caps::HALT, windows_halt as HaltFn)
        .capability(g, "windows", caps::CHANGE_HOST_NAME, windows_hostname as ChangeHostNameFn)
        .capability(g, "windows", caps::MOUNT_SHARED_FOLDER, windows_mount as MountSharedFolderFn)
}
