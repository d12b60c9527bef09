//! Runs a step list as a linked chain with ordered rollback.
//!
//! Instances live in a slab of slots, each linked to its successor. Branch
//! slots keep their original successor so that steps produced by the
//! continuation can be spliced in between on every entry. The entered stack
//! records slots in the order their `call` was first entered. The first frame
//! to see an error undoes the whole stack, newest first, before the error
//! reaches any enclosing step; outer frames then find the stack empty.

use crate::builder::Builder;
use crate::context::Context;
use crate::hook::{ApplyOptions, Hook};
use crate::step::{Continuation, SpecKind, Step, StepSpec};
use crate::{BoxError, CoreError};
use std::rc::Rc;
use tracing::{debug, info, warn};

type SlotId = usize;

/// Polled between steps; `true` stops the pipeline.
pub type InterruptPoll = fn() -> bool;

struct Slot {
    name: String,
    step: Rc<dyn Step>,
    /// Set while the step's `call` is on the stack.
    active: bool,
    continuation: Option<Continuation>,
    next: Option<SlotId>,
    /// Successor before any branch splice.
    after: Option<SlotId>,
    on_stack: bool,
}

struct Chain {
    slots: Vec<Slot>,
    entered: Vec<SlotId>,
    hook: Option<Hook>,
    interrupt: Option<InterruptPoll>,
}

/// Handle to the remainder of the chain, given to every [`Step::call`].
pub struct Next<'a> {
    chain: &'a mut Chain,
    slot: Option<SlotId>,
}

impl Next<'_> {
    /// Enter the next step. A no-op at the end of the chain.
    pub fn call(&mut self, ctx: &mut Context) -> Result<(), BoxError> {
        match self.slot {
            Some(id) => self.chain.enter(id, ctx),
            None => Ok(()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.slot.is_none()
    }
}

impl Chain {
    fn interrupted(&self, ctx: &Context) -> bool {
        ctx.interrupted() || self.interrupt.is_some_and(|poll| poll())
    }

    /// Instantiate `specs` into fresh slots linked in order, the last one
    /// pointing at `tail`. Returns the first slot (or `tail` when empty).
    fn instantiate(&mut self, specs: &[StepSpec], tail: Option<SlotId>, ctx: &Context) -> Option<SlotId> {
        let base = self.slots.len();
        for (i, spec) in specs.iter().enumerate() {
            let next = if i + 1 < specs.len() {
                Some(base + i + 1)
            } else {
                tail
            };
            let (step, continuation) = match &spec.kind {
                SpecKind::Step(factory) => (factory(ctx), None),
                SpecKind::Branch {
                    decide,
                    continuation,
                } => (decide(ctx), Some(continuation.clone())),
            };
            self.slots.push(Slot {
                name: spec.name().to_owned(),
                step: Rc::from(step),
                active: false,
                continuation,
                next,
                after: next,
                on_stack: false,
            });
        }
        if specs.is_empty() {
            tail
        } else {
            Some(base)
        }
    }

    fn enter(&mut self, id: SlotId, ctx: &mut Context) -> Result<(), BoxError> {
        let name = self.slots[id].name.clone();
        if self.interrupted(ctx) {
            warn!("interrupted before '{name}'");
            self.unwind(ctx);
            return Err(CoreError::Interrupted.into());
        }

        if self.slots[id].active {
            self.unwind(ctx);
            return Err(CoreError::StepReentered(name).into());
        }
        let step = Rc::clone(&self.slots[id].step);
        self.slots[id].active = true;
        if !self.slots[id].on_stack {
            self.slots[id].on_stack = true;
            self.entered.push(id);
        }

        debug!("calling IN: {name}");
        let mut result = match self.slots[id].continuation.clone() {
            None => {
                let next = self.slots[id].next;
                step.call(ctx, &mut Next { chain: self, slot: next })
            }
            Some(continuation) => self.run_branch(id, &*step, &continuation, ctx),
        };
        self.slots[id].active = false;
        debug!("calling OUT: {name}");

        if result.is_ok() && self.interrupted(ctx) {
            warn!("interrupted after '{name}'");
            result = Err(CoreError::Interrupted.into());
        }

        if let Err(e) = result {
            if !self.entered.is_empty() {
                debug!("'{name}' failed, rolling back: {e}");
                self.unwind(ctx);
            }
            return Err(e);
        }
        Ok(())
    }

    fn run_branch(
        &mut self,
        id: SlotId,
        decide: &dyn Step,
        continuation: &Continuation,
        ctx: &mut Context,
    ) -> Result<(), BoxError> {
        decide.call(ctx, &mut Next { chain: self, slot: None })?;

        let mut nested = Builder::new();
        continuation(ctx, &mut nested)?;
        if let Some(hook) = &self.hook {
            hook.apply(&mut nested, &ApplyOptions::nested())?;
        }

        let after = self.slots[id].after;
        let first = self.instantiate(nested.specs(), after, ctx);
        self.slots[id].next = first;
        debug!(
            "branch '{}' continues with {:?}",
            self.slots[id].name,
            nested.names()
        );

        Next {
            chain: self,
            slot: first,
        }
        .call(ctx)
    }

    /// Undo every entered step, newest first, including those whose `call`
    /// is still on the stack.
    fn unwind(&mut self, ctx: &mut Context) {
        while let Some(top) = self.entered.pop() {
            let slot = &mut self.slots[top];
            slot.on_stack = false;
            info!("undo: {}", slot.name);
            if let Err(e) = slot.step.undo(ctx) {
                warn!("undo of '{}' failed: {e}", slot.name);
            }
        }
    }
}

/// Executor for a frozen step list. Every [`Warden::run`] instantiates a
/// fresh chain.
#[derive(Debug, Clone)]
pub struct Warden {
    specs: Vec<StepSpec>,
    hook: Option<Hook>,
    interrupt: Option<InterruptPoll>,
}

impl Warden {
    pub fn new(specs: Vec<StepSpec>) -> Self {
        Self {
            specs,
            hook: None,
            interrupt: None,
        }
    }

    /// Apply `hook`'s before/after edits to every builder a branch produces.
    #[must_use]
    pub fn with_hook(mut self, hook: Hook) -> Self {
        self.hook = Some(hook);
        self
    }

    #[must_use]
    pub fn with_interrupt_poll(mut self, poll: InterruptPoll) -> Self {
        self.interrupt = Some(poll);
        self
    }

    /// Run the chain. On failure, every entered step has been undone in
    /// reverse entry order before any enclosing step sees the error, and the
    /// step's own error is returned.
    pub fn run(&self, ctx: &mut Context) -> Result<(), BoxError> {
        let mut chain = Chain {
            slots: Vec::with_capacity(self.specs.len()),
            entered: Vec::new(),
            hook: self.hook.clone(),
            interrupt: self.interrupt,
        };
        let first = chain.instantiate(&self.specs, None, ctx);
        debug!("warden: {} steps", self.specs.len());
        Next {
            chain: &mut chain,
            slot: first,
        }
        .call(ctx)
    }
}
