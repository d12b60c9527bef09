use crate::CoreError;
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, warn};
use vessel_schema::LocksSection;

/// Bounded retry for contended locks: one attempt, then up to `retries`
/// more, `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&LocksSection::default())
    }
}

impl From<&LocksSection> for RetryPolicy {
    fn from(section: &LocksSection) -> Self {
        Self {
            retries: section.retries,
            interval: section.retry_interval(),
        }
    }
}

struct Held {
    owner: ThreadId,
    depth: usize,
    file: File,
}

/// Named file locks under one directory, re-entrant per thread.
///
/// Each name maps to `<dir>/<name>.lock` held with an exclusive `flock`, so
/// other processes are excluded too. A thread that already holds a name
/// nests instead of deadlocking.
pub struct LockManager {
    dir: PathBuf,
    held: Mutex<HashMap<String, Held>>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Held>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, name: &str) -> Result<File, CoreError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.dir.join(format!("{name}.lock")))?)
    }

    pub fn lock(&self, name: &str, policy: RetryPolicy) -> Result<NamedLock<'_>, CoreError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(CoreError::InvalidLockName(name.to_owned()));
        }

        let me = thread::current().id();
        let attempts = policy.retries.saturating_add(1);
        for attempt in 1..=attempts {
            {
                let mut table = self.table();
                match table.get_mut(name) {
                    Some(held) if held.owner == me => {
                        held.depth += 1;
                        debug!("lock '{name}' re-entered (depth {})", held.depth);
                        return Ok(self.guard(name));
                    }
                    Some(_) => {}
                    None => {
                        let file = self.open(name)?;
                        if file.try_lock_exclusive().is_ok() {
                            table.insert(
                                name.to_owned(),
                                Held {
                                    owner: me,
                                    depth: 1,
                                    file,
                                },
                            );
                            debug!("lock '{name}' acquired");
                            return Ok(self.guard(name));
                        }
                    }
                }
            }
            debug!("lock '{name}' busy (attempt {attempt}/{attempts})");
            if attempt < attempts {
                thread::sleep(policy.interval);
            }
        }

        warn!("giving up on lock '{name}' after {attempts} attempts");
        Err(CoreError::LockTimeout {
            name: name.to_owned(),
            attempts,
        })
    }

    fn guard(&self, name: &str) -> NamedLock<'_> {
        NamedLock {
            manager: self,
            name: name.to_owned(),
        }
    }

    fn release(&self, name: &str) {
        let mut table = self.table();
        let Some(held) = table.get_mut(name) else {
            return;
        };
        held.depth -= 1;
        if held.depth == 0 {
            if let Some(held) = table.remove(name) {
                let _ = held.file.unlock();
                debug!("lock '{name}' released");
            }
        }
    }
}

/// Held lock; released (or un-nested) on drop.
#[derive(Debug)]
pub struct NamedLock<'m> {
    manager: &'m LockManager,
    name: String,
}

impl NamedLock<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NamedLock<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.name);
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\ninterrupt received, rolling back after the current step...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
