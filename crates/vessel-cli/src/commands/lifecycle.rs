use super::{
    describe, exit_code_for, json_pretty, spin_fail, spin_ok, spinner, EXIT_FAILURE, EXIT_SUCCESS,
};
use console::Term;
use std::sync::Arc;
use vessel_builtin::actions::{
    ConfirmFn, CONFIRM_DESTROY_KEY, DESTROY_PERFORMED_KEY, FORCE_CONFIRM_DESTROY_KEY,
};
use vessel_builtin::{Action, Environment};
use vessel_core::{BoxError, Context, CoreError};
use vessel_schema::MachineName;

/// Prompt on the terminal; anything but `y`/`yes` declines.
fn prompt_destroy() -> ConfirmFn {
    Box::new(|machine: &str| {
        let term = Term::stderr();
        if term
            .write_str(&format!("Destroy machine '{machine}'? [y/N] "))
            .is_err()
        {
            return false;
        }
        term.read_line()
            .is_ok_and(|answer| matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    })
}

fn seed(action: Action, force: bool, interactive: bool) -> Context {
    let mut ctx = Context::new();
    if action == Action::Destroy {
        if force {
            ctx.insert(FORCE_CONFIRM_DESTROY_KEY, true);
        } else if interactive {
            ctx.insert(CONFIRM_DESTROY_KEY, prompt_destroy());
        }
    }
    ctx
}

fn outcome_label(action: Action, ctx: &Context) -> &'static str {
    match action {
        Action::Destroy if ctx.get::<bool>(DESTROY_PERFORMED_KEY) == Some(&false) => "skipped",
        Action::Destroy if !ctx.contains(DESTROY_PERFORMED_KEY) => "not_created",
        _ => "ok",
    }
}

/// Run `up`, `halt` or `destroy` on each machine. Machines run in parallel
/// up to `parallel`; prompting for destroy forces one at a time.
pub fn run(
    env: &Arc<Environment>,
    action: Action,
    machines: &[MachineName],
    parallel: usize,
    force: bool,
    json: bool,
) -> Result<u8, String> {
    let interactive = !json && Term::stderr().is_term();
    let parallel = if action == Action::Destroy && !force {
        1
    } else {
        parallel.max(1)
    };

    let prompting = action == Action::Destroy && !force && interactive;
    let pb = (!json && !prompting).then(|| spinner(&format!("{action} {} machine(s)...", machines.len())));
    let outcomes = env.run_all(action, machines, parallel, |_| seed(action, force, interactive));

    let mut failures: Vec<(String, BoxError)> = Vec::new();
    let mut report = Vec::with_capacity(outcomes.len());
    for (machine, outcome) in outcomes {
        match outcome {
            Ok(ctx) => report.push(serde_json::json!({
                "machine": machine.as_str(),
                "result": outcome_label(action, &ctx),
            })),
            Err(e) => {
                let interrupted = CoreError::is_interrupt(&*e);
                report.push(serde_json::json!({
                    "machine": machine.as_str(),
                    "result": if interrupted { "interrupted" } else { "failed" },
                    "error": e.to_string(),
                }));
                failures.push((machine.into_inner(), e));
            }
        }
    }

    if let Some(pb) = &pb {
        if failures.is_empty() {
            spin_ok(pb, &format!("{action} finished"));
        } else {
            spin_fail(pb, &format!("{action} failed for {} machine(s)", failures.len()));
        }
    }
    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for entry in &report {
            if let (Some(machine), Some(result)) = (entry["machine"].as_str(), entry["result"].as_str()) {
                println!("{machine}: {result}");
            }
        }
    }

    match failures.as_slice() {
        [] => Ok(EXIT_SUCCESS),
        [(_, e)] if machines.len() == 1 => Err(describe(&**e)),
        _ => {
            let mut code = None;
            for (machine, e) in &failures {
                let msg = describe(&**e);
                code.get_or_insert_with(|| exit_code_for(&msg));
                eprintln!("error: {machine}: {msg}");
            }
            Ok(code.unwrap_or(EXIT_FAILURE))
        }
    }
}
