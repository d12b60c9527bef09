use crate::builder::Builder;
use crate::context::Context;
use crate::warden::Next;
use crate::{BoxError, CoreError};
use std::fmt;
use std::sync::Arc;

/// One unit of pipeline work.
///
/// `call` decides whether and when to forward through `next`; not calling
/// it short-circuits the rest of the chain. `undo` runs during rollback on
/// every step that was entered, including the one that failed, and may run
/// while that step's own `call` is still waiting on `next`. Both take
/// `&self`; steps that remember what they did keep it in a `Cell` or
/// `RefCell`.
pub trait Step {
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError>;

    fn undo(&self, _ctx: &mut Context) -> Result<(), BoxError> {
        Ok(())
    }
}

pub type StepFactory = Arc<dyn Fn(&Context) -> Box<dyn Step> + Send + Sync>;

/// Runs after a branch's decision step and fills a fresh builder with the
/// steps that follow the branch in this run.
pub type Continuation = Arc<dyn Fn(&Context, &mut Builder) -> Result<(), CoreError> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum SpecKind {
    Step(StepFactory),
    Branch {
        decide: StepFactory,
        continuation: Continuation,
    },
}

/// A named, not yet instantiated step. Builders match anchors by name.
#[derive(Clone)]
pub struct StepSpec {
    name: String,
    pub(crate) kind: SpecKind,
}

impl StepSpec {
    pub fn new<S, F>(name: impl Into<String>, factory: F) -> Self
    where
        S: Step + 'static,
        F: Fn(&Context) -> S + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: SpecKind::Step(boxed(factory)),
        }
    }

    /// A step that runs `f` and then forwards.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(name, move |_| FnStep(Arc::clone(&f)))
    }

    /// A branch: run the decision step, then let `continuation` build what
    /// comes next from the context it left behind.
    pub fn branch<S, F, C>(name: impl Into<String>, decide: F, continuation: C) -> Self
    where
        S: Step + 'static,
        F: Fn(&Context) -> S + Send + Sync + 'static,
        C: Fn(&Context, &mut Builder) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: SpecKind::Branch {
                decide: boxed(decide),
                continuation: Arc::new(continuation),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.kind, SpecKind::Branch { .. })
    }
}

fn boxed<S, F>(factory: F) -> StepFactory
where
    S: Step + 'static,
    F: Fn(&Context) -> S + Send + Sync + 'static,
{
    Arc::new(move |ctx| Box::new(factory(ctx)) as Box<dyn Step>)
}

impl fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("branch", &self.is_branch())
            .finish()
    }
}

struct FnStep<F>(Arc<F>);

impl<F> Step for FnStep<F>
where
    F: Fn(&mut Context) -> Result<(), BoxError>,
{
    fn call(&self, ctx: &mut Context, next: &mut Next<'_>) -> Result<(), BoxError> {
        (self.0)(ctx)?;
        next.call(ctx)
    }
}
