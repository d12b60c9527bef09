use crate::builder::Builder;
use crate::context::{Context, ACTION_NAME_KEY};
use crate::hook::{ApplyOptions, HookSet};
use crate::warden::{InterruptPoll, Warden};
use crate::BoxError;
use tracing::info;

/// Runs named actions: applies the hooks registered for the action to a
/// copy of its builder, then executes the result with a fresh warden.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    hooks: HookSet,
    interrupt: Option<InterruptPoll>,
}

impl Runner {
    pub fn new(hooks: HookSet) -> Self {
        Self {
            hooks,
            interrupt: None,
        }
    }

    #[must_use]
    pub fn with_interrupt_poll(mut self, poll: InterruptPoll) -> Self {
        self.interrupt = Some(poll);
        self
    }

    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    pub fn run(&self, action: &str, builder: &Builder, ctx: &mut Context) -> Result<(), BoxError> {
        ctx.insert(ACTION_NAME_KEY, action.to_owned());

        let hook = self.hooks.hook_for(action);
        let mut builder = builder.clone();
        if !hook.is_empty() {
            hook.apply(&mut builder, &ApplyOptions::default())?;
        }
        info!("running action '{action}': {}", builder.names().join(" -> "));

        let mut warden = Warden::new(builder.build());
        if !hook.is_empty() {
            warden = warden.with_hook(hook);
        }
        if let Some(poll) = self.interrupt {
            warden = warden.with_interrupt_poll(poll);
        }
        warden.run(ctx)
    }
}
