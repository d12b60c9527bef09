use super::{describe, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vessel_builtin::actions::PACKAGE_OUTPUT_KEY;
use vessel_builtin::{Action, Environment};
use vessel_core::Context;

pub fn run(
    env: &Arc<Environment>,
    machine: &str,
    output: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    env.machine(machine).map_err(|e| e.to_string())?;
    let pb = (!json).then(|| spinner(&format!("packaging {machine}...")));

    let mut ctx = Context::new();
    if let Some(path) = output {
        ctx.insert(PACKAGE_OUTPUT_KEY, path.to_path_buf());
    }
    let mut ctx = match env.run(Action::Package, machine, ctx) {
        Ok(ctx) => ctx,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "package failed");
            }
            return Err(describe(&*e));
        }
    };
    let written = ctx.remove::<PathBuf>(PACKAGE_OUTPUT_KEY).unwrap_or_default();

    if let Some(pb) = &pb {
        spin_ok(pb, &format!("packaged {machine} into {}", written.display()));
    }
    if json {
        let payload = serde_json::json!({ "machine": machine, "box": written });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
