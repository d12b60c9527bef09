use super::{colorize_state, describe, json_pretty, EXIT_SUCCESS};
use std::sync::Arc;
use vessel_builtin::actions::MACHINE_STATUS_KEY;
use vessel_builtin::{Action, Environment, MachineStatus};
use vessel_core::Context;
use vessel_schema::MachineName;

pub fn run(env: &Arc<Environment>, machines: &[MachineName], json: bool) -> Result<u8, String> {
    let mut statuses = Vec::with_capacity(machines.len());
    for machine in machines {
        let mut ctx = env
            .run(Action::Status, machine, Context::new())
            .map_err(|e| describe(&*e))?;
        if let Some(status) = ctx.remove::<MachineStatus>(MACHINE_STATUS_KEY) {
            statuses.push(status);
        }
    }

    if json {
        println!("{}", json_pretty(&statuses)?);
    } else {
        println!("{:<16} {:<12} {:<10} ID", "MACHINE", "PROVIDER", "STATE");
        for status in &statuses {
            println!(
                "{:<16} {:<12} {:<10} {}",
                status.name,
                status.provider,
                colorize_state(&status.state_label()),
                status.id.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
