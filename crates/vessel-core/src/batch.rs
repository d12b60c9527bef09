use std::panic;
use std::sync::{Mutex, PoisonError};
use std::thread;
use tracing::debug;

/// Run `run` over every job on at most `max_parallel` scoped threads.
///
/// Outcomes come back in input order. Jobs share nothing but `run`, so each
/// pipeline gets its own context. A panicking job is re-raised on the caller.
pub fn run_batch<T, R, F>(jobs: Vec<T>, max_parallel: usize, run: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let total = jobs.len();
    let workers = max_parallel.max(1).min(total);
    debug!("batch: {total} jobs on {workers} threads");

    let queue = Mutex::new(jobs.into_iter().enumerate());
    let mut done: Vec<(usize, R)> = Vec::with_capacity(total);

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut out = Vec::new();
                    loop {
                        let job = queue
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .next();
                        let Some((idx, job)) = job else {
                            break;
                        };
                        out.push((idx, run(job)));
                    }
                    out
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(out) => done.extend(out),
                Err(payload) => panic::resume_unwind(payload),
            }
        }
    });

    done.sort_by_key(|(idx, _)| *idx);
    done.into_iter().map(|(_, r)| r).collect()
}
