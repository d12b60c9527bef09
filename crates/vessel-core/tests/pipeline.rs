use std::fmt;
use std::sync::{Arc, Mutex};
use vessel_core::{
    run_batch, BoxError, Builder, Context, CoreError, Next, Step, StepSpec, Warden, INTERRUPTED_KEY,
};

type Log = Arc<Mutex<Vec<String>>>;

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Forward,
    ShortCircuit,
    Fail,
    /// Forward, then fail after the rest of the chain returned.
    FailAfter,
    /// Forward and swallow whatever comes back.
    Swallow,
    /// Forward, note the error that comes back, and return it.
    Rethrow,
}

struct Recorder {
    name: &'static str,
    mode: Mode,
    has_undo: bool,
    log: Log,
}

impl Recorder {
    fn note(&self, event: &str) {
        self.log.lock().unwrap().push(format!("{}.{event}", self.name));
    }
}

#[derive(Debug)]
struct StepFailed(&'static str);

impl fmt::Display for StepFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.0)
    }
}

impl std::error::Error for StepFailed {}

impl Step for Recorder {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        self.note("call");
        match self.mode {
            Mode::Forward => next.call(ctx),
            Mode::ShortCircuit => Ok(()),
            Mode::Fail => Err(Box::new(StepFailed(self.name))),
            Mode::FailAfter => {
                next.call(ctx)?;
                Err(Box::new(StepFailed(self.name)))
            }
            Mode::Swallow => {
                if let Err(e) = next.call(ctx) {
                    self.note(&format!("swallowed({e})"));
                }
                Ok(())
            }
            Mode::Rethrow => next.call(ctx).inspect_err(|e| {
                self.note(&format!("caught({e})"));
            }),
        }
    }

    fn undo(&self, _ctx: &mut Context) -> Result<(), BoxError> {
        if self.has_undo {
            self.note("undo");
        }
        Ok(())
    }
}

fn step(name: &'static str, mode: Mode, log: &Log) -> StepSpec {
    step_with(name, mode, true, log)
}

fn step_with(name: &'static str, mode: Mode, has_undo: bool, log: &Log) -> StepSpec {
    let log = Arc::clone(log);
    StepSpec::new(name, move |_| Recorder {
        name,
        mode,
        has_undo,
        log: Arc::clone(&log),
    })
}

fn run(specs: Vec<StepSpec>) -> (Result<(), BoxError>, Context) {
    let mut ctx = Context::new();
    let result = Warden::new(specs).run(&mut ctx);
    (result, ctx)
}

#[test]
fn calls_in_order_when_every_step_forwards() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Forward, &log),
        step("B", Mode::Forward, &log),
        step("C", Mode::Forward, &log),
    ]);
    result.unwrap();
    assert_eq!(entries(&log), ["A.call", "B.call", "C.call"]);
}

#[test]
fn short_circuit_skips_the_rest() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Forward, &log),
        step("B", Mode::ShortCircuit, &log),
        step("C", Mode::Forward, &log),
    ]);
    result.unwrap();
    assert_eq!(entries(&log), ["A.call", "B.call"]);
}

#[test]
fn rollback_runs_in_reverse_entry_order() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Forward, &log),
        step("B", Mode::Forward, &log),
        step("C", Mode::Fail, &log),
        step("D", Mode::Forward, &log),
    ]);
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "C failed");
    assert_eq!(
        entries(&log),
        ["A.call", "B.call", "C.call", "C.undo", "B.undo", "A.undo"]
    );
}

#[test]
fn original_error_reaches_caller_unchanged() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Forward, &log),
        step("B", Mode::Fail, &log),
    ]);
    let err = result.unwrap_err();
    let failed = err.downcast_ref::<StepFailed>().expect("original error type");
    assert_eq!(failed.0, "B");
}

#[test]
fn steps_without_undo_do_not_halt_rollback() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Forward, &log),
        step_with("B", Mode::Forward, false, &log),
        step("C", Mode::Fail, &log),
    ]);
    assert!(result.is_err());
    assert_eq!(entries(&log), ["A.call", "B.call", "C.call", "C.undo", "A.undo"]);
}

#[test]
fn post_work_failure_undoes_completed_downstream_steps() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Forward, &log),
        step("B", Mode::FailAfter, &log),
        step("C", Mode::Forward, &log),
        step("D", Mode::Forward, &log),
    ]);
    assert!(result.is_err());
    assert_eq!(
        entries(&log),
        ["A.call", "B.call", "C.call", "D.call", "D.undo", "C.undo", "B.undo", "A.undo"]
    );
}

#[test]
fn swallowed_error_still_undoes_every_entered_step() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Forward, &log),
        step("B", Mode::Swallow, &log),
        step("C", Mode::Forward, &log),
        step("D", Mode::Fail, &log),
    ]);
    result.unwrap();
    assert_eq!(
        entries(&log),
        [
            "A.call",
            "B.call",
            "C.call",
            "D.call",
            "D.undo",
            "C.undo",
            "B.undo",
            "A.undo",
            "B.swallowed(D failed)",
        ]
    );
}

#[test]
fn rollback_finishes_before_an_outer_step_sees_the_error() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Forward, &log),
        step("B", Mode::Rethrow, &log),
        step("C", Mode::Forward, &log),
        step("D", Mode::Fail, &log),
    ]);
    let err = result.unwrap_err();
    assert_eq!(err.downcast_ref::<StepFailed>().map(|f| f.0), Some("D"));
    assert_eq!(
        entries(&log),
        [
            "A.call",
            "B.call",
            "C.call",
            "D.call",
            "D.undo",
            "C.undo",
            "B.undo",
            "A.undo",
            "B.caught(D failed)",
        ]
    );
}

#[test]
fn each_step_is_undone_once_when_the_error_passes_several_frames() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Rethrow, &log),
        step("B", Mode::Rethrow, &log),
        step("C", Mode::Fail, &log),
    ]);
    assert!(result.is_err());
    let undos: Vec<_> = entries(&log)
        .into_iter()
        .filter(|e| e.ends_with(".undo"))
        .collect();
    assert_eq!(undos, ["C.undo", "B.undo", "A.undo"]);
}

#[test]
fn interrupt_flag_set_by_a_step_unwinds() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Forward, &log),
        StepSpec::from_fn("Interrupt", |ctx| {
            ctx.insert(INTERRUPTED_KEY, true);
            Ok(())
        }),
        step("C", Mode::Forward, &log),
    ]);
    let err = result.unwrap_err();
    assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::Interrupted)));
    assert_eq!(entries(&log), ["A.call", "A.undo"]);
}

#[test]
fn interrupt_rolls_back_before_an_outer_step_sees_it() {
    let log = Log::default();
    let (result, _) = run(vec![
        step("A", Mode::Rethrow, &log),
        StepSpec::from_fn("Interrupt", |ctx| {
            ctx.insert(INTERRUPTED_KEY, true);
            Ok(())
        }),
        step("C", Mode::Forward, &log),
    ]);
    assert!(result.is_err());
    assert_eq!(entries(&log), ["A.call", "A.undo", "A.caught(interrupted)"]);
}

/// Decision step standing in for "is the machine created?".
struct Created {
    log: Log,
}

impl Step for Created {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        self.log.lock().unwrap().push("Created.call".to_owned());
        let exists = ctx.flag("exists");
        ctx.set_result(exists);
        next.call(ctx)
    }

    fn undo(&self, _ctx: &mut Context) -> Result<(), BoxError> {
        self.log.lock().unwrap().push("Created.undo".to_owned());
        Ok(())
    }
}

fn up_pipeline(log: &Log, create_mode: Mode) -> Builder {
    let decide_log = Arc::clone(log);
    let branch_log = Arc::clone(log);
    let mut b = Builder::new();
    b.append(step("ConfigValidate", Mode::Forward, log))
        .append(StepSpec::branch(
            "Call(Created)",
            move |_| Created {
                log: Arc::clone(&decide_log),
            },
            move |ctx, b| {
                if ctx.result() == Some(true) {
                    b.append(step("Start", Mode::Forward, &branch_log));
                } else {
                    b.append(step("Provision", Mode::Forward, &branch_log));
                    b.append(step("Create", create_mode, &branch_log));
                }
                Ok(())
            },
        ))
        .append(step("Finish", Mode::Forward, log));
    b
}

fn run_up(exists: bool, create_mode: Mode) -> (Result<(), BoxError>, Vec<String>) {
    let log = Log::default();
    let builder = up_pipeline(&log, create_mode);
    let mut ctx = Context::new().with("exists", exists);
    let result = Warden::new(builder.build()).run(&mut ctx);
    (result, entries(&log))
}

#[test]
fn branch_selects_provision_and_create_when_missing() {
    let (result, log) = run_up(false, Mode::Forward);
    result.unwrap();
    assert_eq!(
        log,
        ["ConfigValidate.call", "Created.call", "Provision.call", "Create.call", "Finish.call"]
    );
}

#[test]
fn branch_selects_start_when_present() {
    let (result, log) = run_up(true, Mode::Forward);
    result.unwrap();
    assert_eq!(
        log,
        ["ConfigValidate.call", "Created.call", "Start.call", "Finish.call"]
    );
}

#[test]
fn branch_is_deterministic() {
    for exists in [false, true] {
        let (_, first) = run_up(exists, Mode::Forward);
        let (_, second) = run_up(exists, Mode::Forward);
        assert_eq!(first, second);
    }
}

#[test]
fn failure_inside_branch_unwinds_through_the_branch() {
    let (result, log) = run_up(false, Mode::Fail);
    assert_eq!(result.unwrap_err().to_string(), "Create failed");
    assert_eq!(
        log,
        [
            "ConfigValidate.call",
            "Created.call",
            "Provision.call",
            "Create.call",
            "Create.undo",
            "Provision.undo",
            "Created.undo",
            "ConfigValidate.undo",
        ]
    );
}

#[test]
fn continuation_error_is_returned() {
    let log = Log::default();
    let decide_log = Arc::clone(&log);
    let specs = vec![
        step("A", Mode::Forward, &log),
        StepSpec::branch(
            "Branch",
            move |_| Created {
                log: Arc::clone(&decide_log),
            },
            |_, b| {
                b.insert_after("missing", StepSpec::from_fn("X", |_| Ok(())))?;
                Ok(())
            },
        ),
    ];
    let (result, _) = run(specs);
    let err = result.unwrap_err();
    assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::StepNotFound(_))));
    assert_eq!(
        entries(&log),
        ["A.call", "Created.call", "Created.undo", "A.undo"]
    );
}

#[test]
fn nested_branches_flatten_in_place() {
    let log = Log::default();
    let outer_log = Arc::clone(&log);
    let inner_log = Arc::clone(&log);
    let decide_outer = Arc::clone(&log);
    let specs = vec![
        StepSpec::branch(
            "Outer",
            move |_| Created {
                log: Arc::clone(&decide_outer),
            },
            move |_, b| {
                let decide_inner = Arc::clone(&inner_log);
                let leaf_log = Arc::clone(&inner_log);
                b.append(step("X", Mode::Forward, &outer_log));
                b.append(StepSpec::branch(
                    "Inner",
                    move |_| Created {
                        log: Arc::clone(&decide_inner),
                    },
                    move |_, b| {
                        b.append(step("Y", Mode::Forward, &leaf_log));
                        Ok(())
                    },
                ));
                b.append(step("Z", Mode::Forward, &outer_log));
                Ok(())
            },
        ),
        step("Tail", Mode::Forward, &log),
    ];
    let (result, _) = run(specs);
    result.unwrap();
    assert_eq!(
        entries(&log),
        ["Created.call", "X.call", "Created.call", "Y.call", "Z.call", "Tail.call"]
    );
}

#[test]
fn batch_runs_independent_pipelines() {
    let machines = vec!["web", "db", "cache", "queue"];
    let outcomes = run_batch(machines.clone(), 2, |machine| {
        let log = Log::default();
        let builder = up_pipeline(&log, if machine == "db" { Mode::Fail } else { Mode::Forward });
        let mut ctx = Context::new().with("machine", machine.to_owned());
        let result = Warden::new(builder.build()).run(&mut ctx);
        (machine, result.map_err(|e| e.to_string()), entries(&log))
    });

    assert_eq!(outcomes.len(), machines.len());
    for ((machine, result, log), expected) in outcomes.iter().zip(&machines) {
        assert_eq!(machine, expected);
        if *machine == "db" {
            assert_eq!(result.as_ref().unwrap_err(), "Create failed");
            assert_eq!(log.last().map(String::as_str), Some("ConfigValidate.undo"));
        } else {
            assert!(result.is_ok());
            assert_eq!(log.last().map(String::as_str), Some("Finish.call"));
        }
    }
}
