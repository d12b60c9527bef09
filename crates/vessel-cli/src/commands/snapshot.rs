use super::{describe, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use std::sync::Arc;
use vessel_builtin::actions::SNAPSHOT_NAME_KEY;
use vessel_builtin::{Action, Environment};
use vessel_core::Context;

pub fn run(env: &Arc<Environment>, machine: &str, name: &str, json: bool) -> Result<u8, String> {
    env.machine(machine).map_err(|e| e.to_string())?;
    let pb = (!json).then(|| spinner(&format!("saving snapshot '{name}' of {machine}...")));

    let ctx = Context::new().with(SNAPSHOT_NAME_KEY, name.to_owned());
    if let Err(e) = env.run(Action::Snapshot, machine, ctx) {
        if let Some(pb) = &pb {
            spin_fail(pb, "snapshot failed");
        }
        return Err(describe(&*e));
    }
    if let Some(pb) = &pb {
        spin_ok(pb, &format!("saved snapshot '{name}'"));
    }
    if json {
        let payload = serde_json::json!({ "machine": machine, "snapshot": name });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
