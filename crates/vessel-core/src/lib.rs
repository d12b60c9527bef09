//! Pipeline engine for Vessel lifecycle actions.
//!
//! A [`Builder`] assembles an ordered list of [`StepSpec`]s, some of which
//! branch into nested builders once a decision step has run. The [`Warden`]
//! instantiates the list into a chain of [`Step`]s sharing one [`Context`]
//! and, when a step fails, undoes every entered step in reverse entry order
//! before handing the original error back. [`Runner`] layers plugin
//! [`Hook`]s on top, [`run_batch`] runs independent pipelines side by side,
//! and [`LockManager`] guards state shared between them.

pub mod batch;
pub mod builder;
pub mod concurrency;
pub mod context;
pub mod hook;
pub mod runner;
pub mod step;
pub mod warden;

pub use batch::run_batch;
pub use builder::Builder;
pub use concurrency::{install_signal_handler, shutdown_requested, LockManager, NamedLock, RetryPolicy};
pub use context::{Context, ACTION_NAME_KEY, INTERRUPTED_KEY, RESULT_KEY};
pub use hook::{ApplyOptions, Hook, HookSet};
pub use runner::Runner;
pub use step::{Continuation, Step, StepSpec};
pub use warden::{Next, Warden};

use thiserror::Error;

/// Error type carried through a pipeline. Steps may fail with anything; the
/// warden hands the same value back to its caller.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("step '{0}' not found in pipeline")]
    StepNotFound(String),
    #[error("index {index} out of range for pipeline of {len} steps")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("step '{0}' re-entered while still running")]
    StepReentered(String),
    #[error("interrupted")]
    Interrupted,
    #[error("timed out waiting for lock '{name}' after {attempts} attempts")]
    LockTimeout { name: String, attempts: u32 },
    #[error("invalid lock name: '{0}'")]
    InvalidLockName(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether a pipeline error is (or wraps) an interrupt.
    pub fn is_interrupt(err: &(dyn std::error::Error + 'static)) -> bool {
        matches!(err.downcast_ref::<CoreError>(), Some(CoreError::Interrupted))
    }
}
