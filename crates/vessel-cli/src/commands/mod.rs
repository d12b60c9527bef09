pub mod cap;
pub mod completions;
pub mod detect;
pub mod lifecycle;
pub mod package;
pub mod plugins;
pub mod snapshot;
pub mod status;

use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vessel_builtin::{BuiltinError, Environment};
use vessel_plugin::PluginError;
use vessel_schema::{parse_config_file, ConfigV1, MachineName};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_RESOLUTION_ERROR: u8 = 3;

const CONFIG_PREFIX: &str = "config error:";
const RESOLUTION_PREFIX: &str = "resolution error:";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "running" => Style::new().green().bold().apply_to(state).to_string(),
        "poweroff" => Style::new().yellow().apply_to(state).to_string(),
        "not_created" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// Load `vessel.toml`; a missing file means an all-default config.
pub fn load_config(path: &Path) -> Result<ConfigV1, String> {
    if !path.exists() {
        return Ok(ConfigV1::default());
    }
    parse_config_file(path).map_err(|e| format!("{CONFIG_PREFIX} {e}"))
}

pub fn load_environment(config: &Path, data_dir: &Path) -> Result<Arc<Environment>, String> {
    let config = load_config(config)?;
    Environment::new(config, data_dir)
        .map(Arc::new)
        .map_err(|e| describe(&e))
}

/// Machines named on the command line, or every configured machine.
pub fn select_machines(env: &Environment, names: &[String]) -> Result<Vec<MachineName>, String> {
    if names.is_empty() {
        return Ok(env.machine_names());
    }
    names
        .iter()
        .map(|n| {
            env.machine(n)
                .map(|_| MachineName::new(n.as_str()))
                .map_err(|e| e.to_string())
        })
        .collect()
}

/// Render an error, prefixed so `main` can pick the exit code.
pub fn describe(err: &(dyn Error + 'static)) -> String {
    if err.downcast_ref::<PluginError>().is_some() {
        return format!("{RESOLUTION_PREFIX} {err}");
    }
    match err.downcast_ref::<BuiltinError>() {
        Some(BuiltinError::Plugin(e)) => format!("{RESOLUTION_PREFIX} {e}"),
        Some(BuiltinError::Config(e)) => format!("{CONFIG_PREFIX} {e}"),
        _ => err.to_string(),
    }
}

pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with(CONFIG_PREFIX) {
        EXIT_CONFIG_ERROR
    } else if msg.starts_with(RESOLUTION_PREFIX) {
        EXIT_RESOLUTION_ERROR
    } else {
        EXIT_FAILURE
    }
}
